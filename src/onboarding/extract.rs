//! AI-assisted extraction of profile values from free-text replies.
//!
//! Every extractor degrades to `None` on backend errors; the failure is
//! logged and the caller treats it as "nothing recognised". Simple replies
//! (a bare year, "2" for female, an exact crop name) are answered without a
//! model call.

use std::sync::{Arc, LazyLock};

use chrono::Datelike;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::customers::model::ProfileValue;
use crate::llm::{ChatMessage, LlmProvider, ResponseFormat, structured_output};

use super::fields::ExtractionMethod;
use super::matcher::LocationExtraction;
use super::prompts;

/// Earliest birth year accepted.
pub const MIN_BIRTH_YEAR: i32 = 1900;

/// Crop candidates offered for disambiguation at most.
const MAX_CROP_CHOICES: usize = 5;

static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,4}$").unwrap_or_else(|e| panic!("invalid number pattern: {e}"))
});

const CROP_SYNONYMS: &[(&str, &str)] = &[
    ("corn", "Maize"),
    ("mahindi", "Maize"),
    ("cocoa", "Cacao"),
    ("cacao", "Cacao"),
    ("manioc", "Cassava"),
    ("yuca", "Cassava"),
    ("mihogo", "Cassava"),
    ("paddy", "Rice"),
    ("avocados", "Avocado"),
    ("coffee beans", "Coffee"),
    ("kahawa", "Coffee"),
    ("tea leaves", "Tea"),
];

/// A value pulled from a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Location(LocationExtraction),
    Value(ProfileValue),
    /// Several plausible values; the farmer must pick one.
    Choices(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Deserialize)]
struct CropReply {
    crop_name: Option<String>,
    #[serde(default = "low_confidence")]
    confidence: Confidence,
    #[serde(default)]
    possible_crops: Vec<String>,
}

fn low_confidence() -> Confidence {
    Confidence::Low
}

#[derive(Debug, Deserialize)]
struct BirthYearReply {
    year: Option<i64>,
    age: Option<i64>,
}

pub struct FieldExtractor {
    llm: Arc<dyn LlmProvider>,
    supported_crops: Vec<String>,
}

impl FieldExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, supported_crops: Vec<String>) -> Self {
        Self {
            llm,
            supported_crops,
        }
    }

    pub fn supported_crops(&self) -> &[String] {
        &self.supported_crops
    }

    /// Run the extractor named by `method`.
    pub async fn extract(&self, method: ExtractionMethod, message: &str) -> Option<Extraction> {
        match method {
            ExtractionMethod::Location => {
                self.extract_location(message).await.map(Extraction::Location)
            }
            ExtractionMethod::CropType => self.extract_crop_type(message).await,
            ExtractionMethod::Gender => self
                .extract_gender(message)
                .await
                .map(|g| Extraction::Value(ProfileValue::from(g))),
            ExtractionMethod::BirthYear => self
                .extract_birth_year(message)
                .await
                .map(|y| Extraction::Value(ProfileValue::Integer(i64::from(y)))),
        }
    }

    /// Province / district / ward mentioned in `message`, if any.
    pub async fn extract_location(&self, message: &str) -> Option<LocationExtraction> {
        if !self.llm.is_configured() {
            debug!("LLM not configured, skipping location extraction");
            return None;
        }

        let data = self
            .ask(
                "location_extraction",
                prompts::LOCATION_SYSTEM_PROMPT,
                message,
                prompts::location_schema(),
            )
            .await?;

        let location: LocationExtraction = match serde_json::from_value(Value::Object(data)) {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "Location extraction returned an unexpected shape");
                return None;
            }
        };

        if location.is_empty() {
            None
        } else {
            Some(location)
        }
    }

    /// Crop constrained to the supported list.
    ///
    /// Returns `Choices` when the reply could mean several supported crops.
    pub async fn extract_crop_type(&self, message: &str) -> Option<Extraction> {
        if let Some(crop) = self.exact_supported_crop(message) {
            return Some(Extraction::Value(ProfileValue::from(crop)));
        }

        let data = self
            .ask(
                "crop_extraction",
                &prompts::crop_system_prompt(&self.supported_crops),
                message,
                prompts::crop_schema(),
            )
            .await?;

        let reply: CropReply = match serde_json::from_value(Value::Object(data)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Crop extraction returned an unexpected shape");
                return None;
            }
        };

        let mut choices: Vec<String> = Vec::new();
        for crop in &reply.possible_crops {
            if let Some(canonical) = self.supported_match(crop)
                && !choices.iter().any(|c| c == canonical)
            {
                choices.push(canonical.to_string());
            }
        }
        if choices.len() >= 2 {
            choices.truncate(MAX_CROP_CHOICES);
            debug!(?choices, "Crop reply is ambiguous");
            return Some(Extraction::Choices(choices));
        }

        match reply.crop_name {
            Some(name) if reply.confidence != Confidence::Low && !name.trim().is_empty() => {
                Some(Extraction::Value(ProfileValue::from(self.canonical_crop(&name))))
            }
            _ => None,
        }
    }

    /// Any crop named in `message`, supported or not.
    pub async fn extract_crop_unconstrained(&self, message: &str) -> Option<String> {
        let data = self
            .ask(
                "open_crop_extraction",
                prompts::OPEN_CROP_SYSTEM_PROMPT,
                message,
                prompts::open_crop_schema(),
            )
            .await?;

        let name = data.get("crop_name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        Some(normalize_crop_name(name))
    }

    /// One of `male`, `female` or `other`.
    pub async fn extract_gender(&self, message: &str) -> Option<&'static str> {
        if let Some(gender) = quick_gender(message) {
            return Some(gender);
        }

        let data = self
            .ask(
                "gender_extraction",
                prompts::GENDER_SYSTEM_PROMPT,
                message,
                prompts::gender_schema(),
            )
            .await?;

        match data.get("gender").and_then(Value::as_str) {
            Some(g) => canonical_gender(g),
            None => None,
        }
    }

    /// Birth year from a stated year or age, within [1900, current year].
    pub async fn extract_birth_year(&self, message: &str) -> Option<i32> {
        let current_year = chrono::Utc::now().year();
        let trimmed = message.trim();

        if BARE_NUMBER.is_match(trimmed) {
            let n: i64 = trimmed.parse().ok()?;
            let stated = if trimmed.len() == 4 {
                StatedBirth::Year(n)
            } else {
                StatedBirth::Age(n)
            };
            return birth_year_from(stated, current_year);
        }

        let data = self
            .ask(
                "birth_year_extraction",
                prompts::BIRTH_YEAR_SYSTEM_PROMPT,
                message,
                prompts::birth_year_schema(),
            )
            .await?;

        let reply: BirthYearReply = serde_json::from_value(Value::Object(data)).ok()?;
        let stated = match (reply.year, reply.age) {
            (Some(year), _) => StatedBirth::Year(year),
            (None, Some(age)) => StatedBirth::Age(age),
            (None, None) => return None,
        };
        birth_year_from(stated, current_year)
    }

    /// Map a clarifying reply onto exactly one of `candidates`.
    pub async fn resolve_crop_ambiguity(&self, reply: &str, candidates: &[String]) -> Option<String> {
        let candidates = &candidates[..candidates.len().min(MAX_CROP_CHOICES)];
        if candidates.is_empty() {
            return None;
        }

        let direct = reply.trim();
        if let Some(hit) = candidates.iter().find(|c| c.eq_ignore_ascii_case(direct)) {
            return Some(hit.clone());
        }

        let data = self
            .ask(
                "crop_resolution",
                &prompts::crop_resolution_system_prompt(candidates),
                reply,
                prompts::crop_resolution_schema(),
            )
            .await?;

        let selected = data.get("selected_crop")?.as_str()?.trim();
        candidates
            .iter()
            .find(|c| c.eq_ignore_ascii_case(selected))
            .cloned()
    }

    /// Canonical supported-crop casing, or `name` unchanged.
    pub fn canonical_crop(&self, name: &str) -> String {
        self.supported_match(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.trim().to_string())
    }

    fn supported_match(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.supported_crops
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    fn exact_supported_crop(&self, message: &str) -> Option<String> {
        let normalized = message.trim().trim_end_matches(['.', '!']);
        self.supported_match(normalized).map(str::to_string)
    }

    /// One structured-output call. Errors and unusable replies are logged and
    /// read as `None`.
    async fn ask(
        &self,
        schema_name: &str,
        system_prompt: &str,
        message: &str,
        schema: Value,
    ) -> Option<Map<String, Value>> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(message),
        ];
        match structured_output(
            self.llm.as_ref(),
            messages,
            ResponseFormat::json_schema(schema_name, schema),
        )
        .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(extractor = schema_name, error = %e, "Extraction call failed");
                None
            }
        }
    }
}

/// A birth stated either as a year or as an age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatedBirth {
    Year(i64),
    Age(i64),
}

/// Resolve a stated year or age against `current_year`, rejecting anything
/// outside [1900, current_year].
pub fn birth_year_from(stated: StatedBirth, current_year: i32) -> Option<i32> {
    let year = match stated {
        StatedBirth::Year(year) => year,
        StatedBirth::Age(age) if age >= 0 => i64::from(current_year) - age,
        StatedBirth::Age(_) => return None,
    };
    if (i64::from(MIN_BIRTH_YEAR)..=i64::from(current_year)).contains(&year) {
        i32::try_from(year).ok()
    } else {
        None
    }
}

fn quick_gender(message: &str) -> Option<&'static str> {
    let normalized = message.trim().trim_end_matches(['.', '!']).to_lowercase();
    match normalized.as_str() {
        "1" | "m" | "male" | "man" => Some("male"),
        "2" | "f" | "female" | "woman" => Some("female"),
        "3" | "other" => Some("other"),
        _ => None,
    }
}

fn canonical_gender(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "male" => Some("male"),
        "female" => Some("female"),
        "other" => Some("other"),
        _ => None,
    }
}

/// Map common synonyms to a canonical name and capitalise the first letter.
pub fn normalize_crop_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    if let Some((_, canonical)) = CROP_SYNONYMS.iter().find(|(synonym, _)| *synonym == lowered) {
        return canonical.to_string();
    }
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
