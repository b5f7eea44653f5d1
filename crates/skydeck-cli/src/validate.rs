//! Input validation for the signup and password flows.
//!
//! These mirror the server's account rules so obviously-invalid input fails
//! before a network round trip.

/// Validate a display name (2-50 characters).
pub fn validate_name(name: &str) -> Option<String> {
    let len = name.chars().count();
    if len < 2 {
        return Some("Name must be at least 2 characters".to_string());
    }
    if len > 50 {
        return Some("Name must be at most 50 characters".to_string());
    }
    None
}

/// Validate an email address shape.
pub fn validate_email(email: &str) -> Option<String> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };

    if valid {
        None
    } else {
        Some("Email address is not valid".to_string())
    }
}

/// Validate password strength: at least 8 characters with a number, an
/// uppercase letter, a lowercase letter, and a special character.
pub fn password_issues(password: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if password.chars().count() < 8 {
        issues.push("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("Password must contain a number".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| "#?!@$%^&*-".contains(c)) {
        issues.push("Password must contain a special character (#?!@$%^&*-)".to_string());
    }

    issues
}

/// Collect every issue with a signup submission.
pub fn signup_issues(name: &str, email: &str, password: &str, confirm: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(issue) = validate_name(name) {
        issues.push(issue);
    }
    if let Some(issue) = validate_email(email) {
        issues.push(issue);
    }
    issues.extend(password_issues(password));
    if password != confirm {
        issues.push("Passwords do not match".to_string());
    }

    issues
}
