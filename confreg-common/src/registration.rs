//! Registration record model and form validation
//!
//! [`RegistrationForm`] is the raw input posted by the registration page.
//! [`RegistrationForm::validate`] is the only way to obtain a
//! [`RegistrationRecord`], so every record that reaches the submission
//! pipeline already satisfies the field rules below:
//!
//! - names, purpose: non-empty after trimming
//! - phone: 6 to 15 digits (optional unless [`PhoneRequirement::Required`])
//! - email: `local@domain.tld`, no whitespace, stored lower-case
//! - age: integer 1..=99
//! - gender: Male / Female / Others
//! - country: member of [`COUNTRIES`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Country code prefixed to phone numbers when the form omits one
pub const DEFAULT_COUNTRY_CODE: &str = "+91";

/// Countries accepted in the region field
pub const COUNTRIES: &[&str] = &[
    "Afghanistan", "Albania", "Algeria", "Argentina", "Armenia", "Australia", "Austria",
    "Azerbaijan", "Bahrain", "Bangladesh", "Belarus", "Belgium", "Bolivia",
    "Bosnia and Herzegovina", "Brazil", "Bulgaria", "Cambodia", "Canada", "Chile", "China",
    "Colombia", "Croatia", "Czech Republic", "Denmark", "Ecuador", "Egypt", "Estonia",
    "Ethiopia", "Finland", "France", "Georgia", "Germany", "Ghana", "Greece", "Hungary",
    "Iceland", "India", "Indonesia", "Iran", "Iraq", "Ireland", "Israel", "Italy", "Japan",
    "Jordan", "Kazakhstan", "Kenya", "Kuwait", "Latvia", "Lebanon", "Lithuania", "Luxembourg",
    "Malaysia", "Mexico", "Morocco", "Nepal", "Netherlands", "New Zealand", "Nigeria",
    "Norway", "Pakistan", "Peru", "Philippines", "Poland", "Portugal", "Qatar", "Romania",
    "Russia", "Saudi Arabia", "Singapore", "Slovakia", "Slovenia", "South Africa",
    "South Korea", "Spain", "Sri Lanka", "Sweden", "Switzerland", "Taiwan", "Thailand",
    "Turkey", "Ukraine", "United Arab Emirates", "United Kingdom", "United States", "Uruguay",
    "Venezuela", "Vietnam",
];

/// Attendee gender as stored by the primary store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Others,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Others => "Others",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            "Others" => Some(Gender::Others),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated registration, the unit of work of the submission pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub first_name: String,
    pub last_name: String,
    /// `"{country_code} {digits}"`, omitted when not provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub email: String,
    pub age: u8,
    pub gender: Gender,
    /// Country (or state) of residence
    pub state: String,
    pub purpose: String,
}

impl RegistrationRecord {
    /// Full display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Identifier assigned by the primary store (serial or UUID column)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreId {
    Int(i64),
    Text(String),
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreId::Int(id) => write!(f, "{}", id),
            StoreId::Text(id) => f.write_str(id),
        }
    }
}

/// Row echoed back by the primary store after an insert or select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRegistration {
    pub id: StoreId,
    #[serde(flatten)]
    pub record: RegistrationRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
}

/// Whether the phone field must be filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneRequirement {
    #[default]
    Optional,
    Required,
}

/// Raw form input as posted by the registration page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub country_code: String,
    pub phone: String,
    pub email: String,
    pub age: String,
    pub gender: String,
    pub country: String,
    pub purpose: String,
    pub agree_to_terms: bool,
}

/// Per-field validation messages, keyed by form field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    fn add(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Message for a field, if it failed
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl RegistrationForm {
    /// Validate every field and build the record
    ///
    /// All failing fields are reported together, not just the first one.
    pub fn validate(
        &self,
        phone_requirement: PhoneRequirement,
    ) -> Result<RegistrationRecord, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            errors.add("firstName", "Please enter your first name");
        }

        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            errors.add("lastName", "Please enter your last name");
        }

        let phone = self.phone.trim();
        if phone.is_empty() {
            if phone_requirement == PhoneRequirement::Required {
                errors.add("phone", "Please enter your phone number");
            }
        } else if !is_valid_phone(phone) {
            errors.add("phone", "Enter a valid phone number (6 to 15 digits)");
        }

        let email = self.email.trim();
        if !is_valid_email(email) {
            errors.add("email", "Enter a valid email");
        }

        let age = self.age.trim();
        let parsed_age = if age.is_empty() {
            errors.add("age", "Please enter your age");
            None
        } else {
            match age.parse::<u8>() {
                Ok(n) if (1..=99).contains(&n) => Some(n),
                _ => {
                    errors.add("age", "Please enter a valid age (1-99)");
                    None
                }
            }
        };

        let gender = Gender::parse(self.gender.trim());
        if gender.is_none() {
            errors.add("gender", "Please select your gender");
        }

        let country = self.country.trim();
        if !COUNTRIES.contains(&country) {
            errors.add("country", "Please select your country");
        }

        let purpose = self.purpose.trim();
        if purpose.is_empty() {
            errors.add("purpose", "Tell us your purpose of visit");
        }

        if !self.agree_to_terms {
            errors.add("agreeToTerms", "Please agree to the terms and conditions");
        }

        match (parsed_age, gender) {
            (Some(age), Some(gender)) if errors.is_empty() => {
                let phone = if phone.is_empty() {
                    None
                } else {
                    let code = match self.country_code.trim() {
                        "" => DEFAULT_COUNTRY_CODE,
                        code => code,
                    };
                    Some(format!("{} {}", code, phone))
                };

                Ok(RegistrationRecord {
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    phone,
                    email: email.to_lowercase(),
                    age,
                    gender,
                    state: country.to_string(),
                    purpose: purpose.to_string(),
                })
            }
            _ => Err(errors),
        }
    }
}

/// 6 to 15 ASCII digits
pub fn is_valid_phone(phone: &str) -> bool {
    (6..=15).contains(&phone.len()) && phone.bytes().all(|b| b.is_ascii_digit())
}

/// `local@domain.tld` with no whitespace and exactly one `@`
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
