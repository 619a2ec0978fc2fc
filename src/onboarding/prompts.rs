//! Extraction prompts, response schemas and farmer-facing messages.

use serde_json::{Value, json};

use crate::customers::model::ProfileValue;

// ── Extraction prompts ──────────────────────────────────────────────

pub const LOCATION_SYSTEM_PROMPT: &str = "\
You extract farm locations from messages sent by farmers over WhatsApp.
Identify the administrative units the farmer mentions: province (or region), district and ward.
- Use null for any level that is not mentioned. Do not guess missing levels.
- Keep names as written, fixing only obvious spelling mistakes.
- full_text is the part of the message that describes the location.";

pub fn crop_system_prompt(supported_crops: &[String]) -> String {
    format!(
        "\
You identify which crop a farmer grows from their WhatsApp message.
Supported crops: {crops}.
- crop_name must be one of the supported crops, or null if the farmer names none of them.
- confidence is high when the crop is named directly, medium when it is implied, low when unsure.
- If the message could mean more than one supported crop, list them in possible_crops.",
        crops = supported_crops.join(", ")
    )
}

pub const OPEN_CROP_SYSTEM_PROMPT: &str = "\
You identify the crop a farmer names in a WhatsApp message, whether or not it is a common crop.
Return the crop name in English in crop_name, or null if no crop is named.";

pub const GENDER_SYSTEM_PROMPT: &str = "\
You read a farmer's answer to the question \"What is your gender? 1. Male 2. Female 3. Other\".
Map numbers, words in any language and descriptions to male, female or other.
Return null if the answer is unclear.";

pub const BIRTH_YEAR_SYSTEM_PROMPT: &str = "\
You read a farmer's answer to \"What year were you born, or how old are you?\".
If they state a birth year return it in year. If they state an age return it in age.
Use null for anything not stated. Numbers may be written as words.";

pub fn crop_resolution_system_prompt(candidates: &[String]) -> String {
    let options = numbered_list(candidates);
    format!(
        "\
A farmer was asked to choose their crop from this list:
{options}
Read their reply and return the chosen crop exactly as written in the list in selected_crop.
Replies may be a number, an ordinal (\"the second one\") or the crop name.
Return null if the reply does not pick one of the listed crops."
    )
}

// ── Response schemas ────────────────────────────────────────────────

fn nullable_string() -> Value {
    json!({"type": ["string", "null"]})
}

pub fn location_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "province": nullable_string(),
            "district": nullable_string(),
            "ward": nullable_string(),
            "full_text": nullable_string(),
        },
        "required": ["province", "district", "ward", "full_text"],
        "additionalProperties": false,
    })
}

pub fn crop_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "crop_name": nullable_string(),
            "confidence": {"type": "string", "enum": ["high", "medium", "low"]},
            "possible_crops": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["crop_name", "confidence", "possible_crops"],
        "additionalProperties": false,
    })
}

pub fn open_crop_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"crop_name": nullable_string()},
        "required": ["crop_name"],
        "additionalProperties": false,
    })
}

pub fn gender_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "gender": {"type": ["string", "null"], "enum": ["male", "female", "other", null]},
        },
        "required": ["gender"],
        "additionalProperties": false,
    })
}

pub fn birth_year_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "year": {"type": ["integer", "null"]},
            "age": {"type": ["integer", "null"]},
        },
        "required": ["year", "age"],
        "additionalProperties": false,
    })
}

pub fn crop_resolution_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"selected_crop": nullable_string()},
        "required": ["selected_crop"],
        "additionalProperties": false,
    })
}

// ── Farmer-facing messages ──────────────────────────────────────────

pub const COMPLETION_MESSAGE: &str =
    "Thank you, your profile is all set up! You can now send us any farming question.";

pub const FAILURE_MESSAGE: &str = "Sorry, we couldn't complete your registration. \
Please contact our support team and an extension officer will help you get set up.";

pub const SAVE_FAILED_MESSAGE: &str =
    "Sorry, we had trouble saving your answer. Please try again.";

pub const LOCATION_NOT_FOUND_MESSAGE: &str = "We couldn't find a matching location. \
Please be more specific, for example include your ward and district names.";

pub const SKIPPED_ACK: &str = "No problem, we'll skip that.";

pub const MOVING_ON_ACK: &str = "No problem, let's move on.";

/// Generic reply when a message could not be processed at all.
pub fn didnt_understand(question: &str) -> String {
    format!("Sorry, I didn't understand that.\n\n{question}")
}

/// Retry prompt for a reply that yielded nothing.
pub fn retry_message(question: &str) -> String {
    format!("Sorry, I couldn't identify that in your message. Please try again.\n\n{question}")
}

/// Crop retry: the full question after the first miss, then just the list.
pub fn crop_retry_message(previous_attempts: u32, question: &str, supported_crops: &[String]) -> String {
    if previous_attempts == 0 {
        format!("Sorry, I couldn't identify the crop.\n\n{question}")
    } else {
        format!("Please reply with one of: {}.", supported_crops.join(", "))
    }
}

pub fn ambiguous_location_message(paths: &[String]) -> String {
    format!(
        "We found more than one matching location. Please reply with the number of yours:\n{}",
        numbered_list(paths)
    )
}

pub fn crop_choice_message(crops: &[String]) -> String {
    format!(
        "Which of these crops do you mean? Please reply with the number:\n{}",
        numbered_list(crops)
    )
}

pub fn invalid_selection_message(options: &[String]) -> String {
    format!(
        "Please reply with the number of your choice:\n{}",
        numbered_list(options)
    )
}

pub fn out_of_range_message(count: usize) -> String {
    format!("Please reply with a number between 1 and {count}.")
}

pub fn salvaged_ack(value: &ProfileValue) -> String {
    format!("Thanks, we've noted \"{value}\".")
}

pub fn numbered_list(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{}. {option}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crops() -> Vec<String> {
        vec!["Maize".into(), "Cacao".into(), "Rice".into()]
    }

    #[test]
    fn numbered_list_is_one_based() {
        assert_eq!(
            numbered_list(&["A > B".to_string(), "C > D".to_string()]),
            "1. A > B\n2. C > D"
        );
    }

    #[test]
    fn crop_prompt_lists_crops() {
        let prompt = crop_system_prompt(&crops());
        assert!(prompt.contains("Maize, Cacao, Rice"));
    }

    #[test]
    fn crop_retry_differs_after_first_miss() {
        let first = crop_retry_message(0, "Which crop?", &crops());
        assert!(first.contains("Which crop?"));

        let later = crop_retry_message(1, "Which crop?", &crops());
        assert!(!later.contains("Which crop?"));
        assert!(later.contains("Maize, Cacao, Rice"));
    }

    #[test]
    fn resolution_prompt_numbers_candidates() {
        let prompt = crop_resolution_system_prompt(&crops());
        assert!(prompt.contains("2. Cacao"));
    }

    #[test]
    fn schemas_require_every_property() {
        for schema in [
            location_schema(),
            crop_schema(),
            open_crop_schema(),
            gender_schema(),
            birth_year_schema(),
            crop_resolution_schema(),
        ] {
            let props = schema["properties"].as_object().unwrap().len();
            let required = schema["required"].as_array().unwrap().len();
            assert_eq!(props, required);
        }
    }

    #[test]
    fn out_of_range_names_the_range() {
        assert_eq!(out_of_range_message(3), "Please reply with a number between 1 and 3.");
    }
}
