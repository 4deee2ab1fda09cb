//! Validation utilities for the Farm Surveillance Platform

use rust_decimal::Decimal;

// ============================================================================
// Account Validations
// ============================================================================

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if validator::validate_email(email) {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate the confirmation matches the password
pub fn validate_passwords_match(password: &str, confirm: &str) -> Result<(), &'static str> {
    if password != confirm {
        return Err("Passwords don't match");
    }
    Ok(())
}

/// Validate username: 1-150 characters of letters, digits and `@.+-_`
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("Username cannot be empty");
    }
    if username.chars().count() > 150 {
        return Err("Username must be at most 150 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err("Username may only contain letters, digits and @/./+/-/_");
    }
    Ok(())
}

/// Validate an Australian contact number.
/// Accepts: 0412345678, 0412 345 678, (08) 8999 1234, +61412345678
pub fn validate_contact_number(phone: &str) -> Result<(), &'static str> {
    if phone.chars().count() > 20 {
        return Err("Contact number must be at most 20 characters");
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+'))
    {
        return Err("Contact number contains invalid characters");
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    // Local format: 10 digits starting with 0
    if digits.len() == 10 && digits.starts_with('0') {
        return Ok(());
    }
    // International format: 61 followed by 9 digits
    if digits.len() == 11 && digits.starts_with("61") {
        return Ok(());
    }

    Err("Invalid contact number format")
}

// ============================================================================
// Farm Validations
// ============================================================================

/// Validate farm size in hectares
pub fn validate_size_hectares(size: Decimal) -> Result<(), &'static str> {
    if size <= Decimal::ZERO {
        return Err("Farm size must be greater than 0 hectares");
    }
    if size >= Decimal::from(100_000_000) {
        return Err("Farm size is too large");
    }
    if size.scale() > 2 && size.round_dp(2) != size {
        return Err("Farm size can have at most 2 decimal places");
    }
    Ok(())
}

/// Validate stocking rate (plants per hectare)
pub fn validate_stocking_rate(rate: i32) -> Result<(), &'static str> {
    if rate <= 0 {
        return Err("Stocking rate must be at least 1 plant per hectare");
    }
    Ok(())
}

// ============================================================================
// Surveillance Validations
// ============================================================================

/// Validate the number of plants surveyed against the farm's total
pub fn validate_plants_surveyed(plants_surveyed: i32, total_plants: Option<i64>) -> Result<(), String> {
    if plants_surveyed < 0 {
        return Err("Number of plants surveyed cannot be negative.".to_string());
    }
    if let Some(total) = total_plants {
        if plants_surveyed as i64 > total {
            return Err(format!(
                "Number of plants surveyed ({}) cannot exceed the total plants calculated for this farm ({}).",
                plants_surveyed, total
            ));
        }
    }
    Ok(())
}

/// Validate latitude/longitude are within WGS84 bounds
pub fn validate_coordinates(latitude: Decimal, longitude: Decimal) -> Result<(), &'static str> {
    if latitude < Decimal::from(-90) || latitude > Decimal::from(90) {
        return Err("Latitude must be between -90 and 90");
    }
    if longitude < Decimal::from(-180) || longitude > Decimal::from(180) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

/// Validate GPS accuracy radius in metres
pub fn validate_gps_accuracy(accuracy: Decimal) -> Result<(), &'static str> {
    if accuracy < Decimal::ZERO {
        return Err("GPS accuracy cannot be negative");
    }
    // Stored with 2 decimal places, below one million metres
    if accuracy.round_dp(2) >= Decimal::from(1_000_000) {
        return Err("GPS accuracy must be less than 1,000,000 metres");
    }
    Ok(())
}

/// Validate a calendar month (1-12)
pub fn validate_month(month: u32) -> Result<(), &'static str> {
    if !(1..=12).contains(&month) {
        return Err("Month must be between 1 and 12");
    }
    Ok(())
}

/// Validate an image upload's declared content type
pub fn validate_image_content_type(content_type: &str) -> Result<(), &'static str> {
    if content_type.starts_with("image/") {
        Ok(())
    } else {
        Err("Only image uploads are accepted")
    }
}

/// File extension for a supported image content type
pub fn image_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/gif" => "gif",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Account Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("grower@example.com").is_ok());
        assert!(validate_email("first.last@farm.com.au").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_passwords_match() {
        assert!(validate_passwords_match("mangoes123", "mangoes123").is_ok());
        assert_eq!(
            validate_passwords_match("mangoes123", "mangoes124"),
            Err("Passwords don't match")
        );
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("grower_01").is_ok());
        assert!(validate_username("jo.smith+nt@farm").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_validate_contact_number_valid() {
        assert!(validate_contact_number("0412345678").is_ok());
        assert!(validate_contact_number("0412 345 678").is_ok());
        assert!(validate_contact_number("(08) 8999 1234").is_ok());
        assert!(validate_contact_number("+61412345678").is_ok());
    }

    #[test]
    fn test_validate_contact_number_invalid() {
        assert!(validate_contact_number("12345").is_err());
        assert!(validate_contact_number("412345678").is_err());
        assert!(validate_contact_number("04123x5678").is_err());
        assert!(validate_contact_number("+6641234567890").is_err());
    }

    // ========================================================================
    // Farm Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_size_hectares() {
        assert!(validate_size_hectares(Decimal::new(250, 2)).is_ok());
        assert!(validate_size_hectares(Decimal::from(40)).is_ok());
        assert!(validate_size_hectares(Decimal::ZERO).is_err());
        assert!(validate_size_hectares(Decimal::from(-3)).is_err());
        assert!(validate_size_hectares(Decimal::new(1234, 3)).is_err());
    }

    #[test]
    fn test_validate_stocking_rate() {
        assert!(validate_stocking_rate(100).is_ok());
        assert!(validate_stocking_rate(0).is_err());
        assert!(validate_stocking_rate(-5).is_err());
    }

    // ========================================================================
    // Surveillance Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_plants_surveyed() {
        assert!(validate_plants_surveyed(0, Some(1000)).is_ok());
        assert!(validate_plants_surveyed(1000, Some(1000)).is_ok());
        assert!(validate_plants_surveyed(50, None).is_ok());
        assert!(validate_plants_surveyed(-1, None).is_err());
        let err = validate_plants_surveyed(1001, Some(1000)).unwrap_err();
        assert!(err.contains("(1001)"));
        assert!(err.contains("(1000)"));
    }

    #[test]
    fn test_validate_coordinates() {
        // Darwin, NT
        assert!(validate_coordinates(Decimal::new(-124634, 4), Decimal::new(1308456, 4)).is_ok());
        assert!(validate_coordinates(Decimal::from(91), Decimal::ZERO).is_err());
        assert!(validate_coordinates(Decimal::ZERO, Decimal::from(-181)).is_err());
    }

    #[test]
    fn test_validate_gps_accuracy() {
        assert!(validate_gps_accuracy(Decimal::new(45, 1)).is_ok());
        assert!(validate_gps_accuracy(Decimal::from(-1)).is_err());
        assert!(validate_gps_accuracy(Decimal::new(99_999_999, 2)).is_ok());
        assert!(validate_gps_accuracy(Decimal::from(1_000_000)).is_err());
        assert!(validate_gps_accuracy(Decimal::new(9_999_999_995, 4)).is_err());
    }

    #[test]
    fn test_validate_month() {
        assert!(validate_month(1).is_ok());
        assert!(validate_month(12).is_ok());
        assert!(validate_month(0).is_err());
        assert!(validate_month(13).is_err());
    }

    #[test]
    fn test_image_content_types() {
        assert!(validate_image_content_type("image/jpeg").is_ok());
        assert!(validate_image_content_type("application/pdf").is_err());
        assert_eq!(image_extension("image/png"), "png");
        assert_eq!(image_extension("image/x-unknown"), "bin");
    }
}
