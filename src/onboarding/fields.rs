//! Collectible profile fields and their static configuration.

use serde::Serialize;

pub const ADMINISTRATION: &str = "administration";
pub const CROP_TYPE: &str = "crop_type";
pub const GENDER: &str = "gender";
pub const BIRTH_YEAR: &str = "birth_year";

/// Placeholder in questions replaced by the supported-crop list.
pub const AVAILABLE_CROPS_PLACEHOLDER: &str = "{available_crops}";
/// Placeholder in success templates replaced by the saved value.
pub const VALUE_PLACEHOLDER: &str = "{value}";

const SKIP_HINT: &str = "\n\nReply 'skip' if you prefer not to answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Location,
    String,
    Enum,
    Integer,
}

/// Which extractor turns a reply into a value for the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Location,
    CropType,
    Gender,
    BirthYear,
}

/// Static description of one profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Ascending: lower is asked earlier.
    pub priority: u32,
    pub required: bool,
    pub field_type: FieldType,
    pub extraction_method: ExtractionMethod,
    /// At least 1.
    pub max_attempts: u32,
    pub initial_question: &'static str,
    pub success_message_template: &'static str,
    /// Store a best-effort value instead of failing once attempts run out.
    pub save_invalid_on_max_attempts: bool,
}

impl FieldDescriptor {
    /// The question to send, with the crop list filled in and the skip hint
    /// appended for optional fields.
    pub fn question(&self, supported_crops: &[String]) -> String {
        let mut question = self
            .initial_question
            .replace(AVAILABLE_CROPS_PLACEHOLDER, &supported_crops.join(", "));
        if !self.required {
            question.push_str(SKIP_HINT);
        }
        question
    }

    pub fn success_message(&self, value: &str) -> String {
        self.success_message_template.replace(VALUE_PLACEHOLDER, value)
    }
}

/// Ordered, immutable set of fields collected during onboarding.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldDescriptor>,
}

impl FieldRegistry {
    /// Build a registry; fields are ordered by priority.
    pub fn new(mut fields: Vec<FieldDescriptor>) -> Self {
        fields.sort_by_key(|f| f.priority);
        Self { fields }
    }

    /// All fields, priority ascending.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn optional(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.required)
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new(vec![
            FieldDescriptor {
                name: ADMINISTRATION,
                priority: 1,
                required: true,
                field_type: FieldType::Location,
                extraction_method: ExtractionMethod::Location,
                max_attempts: 3,
                initial_question: "Welcome! To give you advice that fits your farm, please tell us where you farm: your province, district and ward.",
                success_message_template: "Thank you! Your location is set to {value}.",
                save_invalid_on_max_attempts: false,
            },
            FieldDescriptor {
                name: CROP_TYPE,
                priority: 2,
                required: true,
                field_type: FieldType::String,
                extraction_method: ExtractionMethod::CropType,
                max_attempts: 3,
                initial_question: "Which crop do you mainly grow? We currently support: {available_crops}.",
                success_message_template: "Great, we'll share advice for {value}.",
                save_invalid_on_max_attempts: false,
            },
            FieldDescriptor {
                name: GENDER,
                priority: 3,
                required: false,
                field_type: FieldType::Enum,
                extraction_method: ExtractionMethod::Gender,
                max_attempts: 2,
                initial_question: "What is your gender?\n1. Male\n2. Female\n3. Other",
                success_message_template: "Thanks, we've noted your gender as {value}.",
                save_invalid_on_max_attempts: false,
            },
            FieldDescriptor {
                name: BIRTH_YEAR,
                priority: 4,
                required: false,
                field_type: FieldType::Integer,
                extraction_method: ExtractionMethod::BirthYear,
                max_attempts: 2,
                initial_question: "What year were you born? You can also just tell us your age.",
                success_message_template: "Thanks, we've recorded your birth year as {value}.",
                save_invalid_on_max_attempts: false,
            },
        ])
    }
}
