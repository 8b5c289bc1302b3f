//! Input validation for API requests.
//!
//! Validators return `Err` with the user-facing message; the handlers wrap
//! them into `ApiError::validation`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Permissive email shape check: local part, one @, dotted domain
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    /// Phone numbers: digits with optional +, spaces, dashes and parens
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[\d\s\-()]{5,30}$").unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("El correo es obligatorio.".to_string());
    }

    if email.len() > 254 {
        return Err("El correo es demasiado largo.".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("El formato del correo no es válido.".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 6 {
        return Err("La contraseña debe tener al menos 6 caracteres.".to_string());
    }

    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("El nombre es obligatorio.".to_string());
    }

    if name.len() > 120 {
        return Err("El nombre es demasiado largo (máximo 120 caracteres).".to_string());
    }

    Ok(())
}

pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    if let Some(p) = phone {
        if p.is_empty() {
            return Ok(()); // Empty string treated as no phone
        }

        if !PHONE_REGEX.is_match(p) {
            return Err("El formato del teléfono no es válido.".to_string());
        }
    }

    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("El precio no puede ser negativo.".to_string());
    }

    Ok(())
}

pub fn validate_stock(stock: i64) -> Result<(), String> {
    if stock < 0 {
        return Err("El stock no puede ser negativo.".to_string());
    }

    Ok(())
}
