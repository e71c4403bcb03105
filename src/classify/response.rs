use serde_json::Value;

use super::{ClassifierError, RawClassification};

pub fn parse_classification(text: &str) -> Result<RawClassification, ClassifierError> {
    let body = strip_code_fence(text);

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(first_err) => {
            let repaired = repair_truncated_json(body)
                .ok_or_else(|| ClassifierError::Malformed(first_err.to_string()))?;
            serde_json::from_str::<Value>(&repaired).map_err(|err| {
                ClassifierError::Malformed(format!("{first_err}; repair failed: {err}"))
            })?
        }
    };

    entries_from_value(&value)
}

fn entries_from_value(value: &Value) -> Result<RawClassification, ClassifierError> {
    let Some(object) = value.as_object() else {
        return Err(ClassifierError::Malformed(
            "expected a JSON object keyed by region id".to_string(),
        ));
    };

    let mut entries = RawClassification::new();
    for (short_id, entry) in object {
        let key = match entry {
            Value::String(key) => Some(key.trim().to_string()),
            Value::Object(fields) => fields
                .get("cdm_key")
                .and_then(Value::as_str)
                .map(|key| key.trim().to_string()),
            _ => None,
        };
        entries.insert(short_id.clone(), key.filter(|key| !key.is_empty()));
    }

    Ok(entries)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // drop the fence line, e.g. ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}

pub fn repair_truncated_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let body = &text[start..];

    let mut open = Vec::<char>::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_cut: Option<(usize, Vec<char>)> = None;

    for (index, character) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == '"' {
                in_string = false;
            }
            continue;
        }

        match character {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.pop() != Some(character) {
                    return None;
                }
                if open.is_empty() {
                    return Some(body[..=index].to_string());
                }
                last_cut = Some((index + 1, open.clone()));
            }
            ',' => last_cut = Some((index, open.clone())),
            _ => {}
        }
    }

    let (cut, still_open) = last_cut?;
    let mut repaired = body[..cut].trim_end().to_string();
    for closer in still_open.iter().rev() {
        repaired.push(*closer);
    }
    Some(repaired)
}
