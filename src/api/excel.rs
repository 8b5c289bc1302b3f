//! Excel import/export for the product catalog.
//!
//! Deliberately a thin seam: one function builds a workbook from the
//! product rows, one parses an uploaded workbook back into row structs.
//! Everything else is the same upsert logic the JSON endpoints use.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use calamine::{Data, Reader, Xlsx};
use chrono::Utc;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, SERVER_ERROR_MESSAGE};

const EXPORT_HEADERS: [&str; 5] = ["Código", "Nombre", "Descripción", "Precio", "Stock"];

#[derive(Debug, sqlx::FromRow)]
struct ExportRow {
    code: Option<String>,
    name: String,
    description: Option<String>,
    price: f64,
    stock: i64,
}

#[derive(Debug, PartialEq)]
struct ImportedRow {
    code: String,
    name: String,
    description: Option<String>,
    price: f64,
    stock: i64,
}

/// Download the catalog as an xlsx workbook
///
/// GET /api/productos/export-excel
pub async fn export_excel(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let rows: Vec<ExportRow> = sqlx::query_as(
        "SELECT code, name, description, price, stock FROM products ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    let buffer = build_workbook(&rows).map_err(|e| {
        tracing::error!("Failed to build export workbook: {}", e);
        ApiError::internal(SERVER_ERROR_MESSAGE)
    })?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"productos.xlsx\"",
            ),
        ],
        buffer,
    )
        .into_response())
}

/// Upsert catalog rows from an uploaded xlsx workbook. Rows are matched
/// by barcode; unknown codes become new products owned by the caller.
///
/// POST /api/productos/import-excel
pub async fn import_excel(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut data = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::validation("No se subió ningún archivo.")
    })? {
        if field.name() == Some("file") {
            data = Some(field.bytes().await.map_err(|e| {
                tracing::error!("Failed to read upload body: {}", e);
                ApiError::validation("No se subió ningún archivo.")
            })?);
            break;
        }
    }
    let data = data.ok_or_else(|| ApiError::validation("No se subió ningún archivo."))?;

    let rows = parse_workbook(&data)?;
    if rows.is_empty() {
        return Err(ApiError::validation(
            "El archivo no contiene filas de productos.",
        ));
    }

    let mut inserted = 0u64;
    let mut updated = 0u64;
    let now = Utc::now().to_rfc3339();
    for row in &rows {
        let result = sqlx::query(
            "UPDATE products SET name = ?, description = ?, price = ?, stock = ?, updated_at = ?
             WHERE code = ?",
        )
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.price)
        .bind(row.stock)
        .bind(&now)
        .bind(&row.code)
        .execute(&state.db)
        .await?;

        if result.rows_affected() > 0 {
            updated += 1;
        } else {
            sqlx::query(
                "INSERT INTO products (product_id, user_id, code, name, description, price, stock, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&auth.user_id)
            .bind(&row.code)
            .bind(&row.name)
            .bind(&row.description)
            .bind(row.price)
            .bind(row.stock)
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;
            inserted += 1;
        }
    }

    tracing::info!(inserted, updated, by = %auth.user_id, "Excel import completed");

    Ok(Json(json!({
        "message": "Importación completada.",
        "inserted": inserted,
        "updated": updated,
    })))
}

/// The import endpoint only answers POST; the frontend occasionally probes
/// it with GET.
///
/// GET /api/productos/import-excel
pub async fn import_excel_get() -> ApiError {
    ApiError::method_not_allowed(
        "Método GET no permitido. Usa POST con FormData para importar Excel.",
    )
}

fn build_workbook(rows: &[ExportRow]) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Productos")?;

    for (col, title) in EXPORT_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *title)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, row.code.as_deref().unwrap_or(""))?;
        sheet.write_string(r, 1, &row.name)?;
        sheet.write_string(r, 2, row.description.as_deref().unwrap_or(""))?;
        sheet.write_number(r, 3, row.price)?;
        sheet.write_number(r, 4, row.stock as f64)?;
    }

    workbook.save_to_buffer()
}

fn parse_workbook(data: &[u8]) -> Result<Vec<ImportedRow>, ApiError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(data.to_vec()))
        .map_err(|_| ApiError::validation("El archivo no es un Excel válido."))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::validation("El archivo no contiene hojas."))?
        .map_err(|_| ApiError::validation("El archivo no es un Excel válido."))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| ApiError::validation("El archivo está vacío."))?;

    let find = |name: &str| -> Option<usize> {
        header
            .iter()
            .position(|cell| normalize_header(&cell_str(cell)) == name)
    };
    let code_col =
        find("codigo").ok_or_else(|| ApiError::validation("Falta la columna Código."))?;
    let name_col =
        find("nombre").ok_or_else(|| ApiError::validation("Falta la columna Nombre."))?;
    let description_col = find("descripcion");
    let price_col = find("precio");
    let stock_col = find("stock");

    let mut imported = Vec::new();
    for row in rows {
        let code = cell_str(row.get(code_col).unwrap_or(&Data::Empty));
        let name = cell_str(row.get(name_col).unwrap_or(&Data::Empty));
        if code.is_empty() || name.is_empty() {
            continue; // blank or partial rows are skipped, not an error
        }

        let description = description_col
            .and_then(|c| row.get(c))
            .map(cell_str)
            .filter(|s| !s.is_empty());
        let price = price_col
            .and_then(|c| row.get(c))
            .and_then(cell_f64)
            .unwrap_or(0.0);
        let stock = stock_col
            .and_then(|c| row.get(c))
            .and_then(cell_f64)
            .unwrap_or(0.0) as i64;

        imported.push(ImportedRow {
            code,
            name,
            description,
            price,
            stock: stock.max(0),
        });
    }

    Ok(imported)
}

fn cell_str(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            // Barcodes read back as floats; keep them integral when possible
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn cell_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Lowercase and strip the accents that show up in the Spanish headers.
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Código"), "codigo");
        assert_eq!(normalize_header("  NOMBRE "), "nombre");
        assert_eq!(normalize_header("Descripción"), "descripcion");
        assert_eq!(normalize_header("stock"), "stock");
    }

    #[test]
    fn test_cell_conversions() {
        assert_eq!(cell_str(&Data::String(" 7701234 ".to_string())), "7701234");
        assert_eq!(cell_str(&Data::Float(7701234.0)), "7701234");
        assert_eq!(cell_str(&Data::Empty), "");

        assert_eq!(cell_f64(&Data::Float(12.5)), Some(12.5));
        assert_eq!(cell_f64(&Data::String("12,5".to_string())), Some(12.5));
        assert_eq!(cell_f64(&Data::Empty), None);
    }

    #[test]
    fn test_export_produces_xlsx_bytes() {
        let rows = vec![ExportRow {
            code: Some("7701234".to_string()),
            name: "Café 500g".to_string(),
            description: None,
            price: 12.5,
            stock: 10,
        }];
        let buffer = build_workbook(&rows).unwrap();
        // xlsx files are zip archives
        assert_eq!(&buffer[..2], b"PK");
    }

    #[test]
    fn test_import_roundtrip_through_export() {
        let rows = vec![
            ExportRow {
                code: Some("7701234".to_string()),
                name: "Café 500g".to_string(),
                description: Some("Tostado".to_string()),
                price: 12.5,
                stock: 10,
            },
            ExportRow {
                code: None, // exported blank, skipped on import
                name: "Sin código".to_string(),
                description: None,
                price: 1.0,
                stock: 1,
            },
        ];
        let buffer = build_workbook(&rows).unwrap();

        let imported = parse_workbook(&buffer).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].code, "7701234");
        assert_eq!(imported[0].name, "Café 500g");
        assert_eq!(imported[0].description.as_deref(), Some("Tostado"));
        assert_eq!(imported[0].price, 12.5);
        assert_eq!(imported[0].stock, 10);
    }

    #[test]
    fn test_import_rejects_non_excel() {
        assert!(parse_workbook(b"esto no es un excel").is_err());
    }
}
