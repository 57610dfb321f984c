//! Checklist submission validation and answer encoding

use super::template::ChecklistTemplate;
use crate::codes::Code;
use crate::config::ComplementEncoding;
use crate::model::{ChecklistAnswer, ChecklistStatus, ProductType};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Operator's answer to one question as received from the form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemResponse {
    pub status: Option<ChecklistStatus>,
    #[serde(default)]
    pub complement: Option<String>,
}

impl ItemResponse {
    pub fn answered(status: ChecklistStatus) -> Self {
        Self { status: Some(status), complement: None }
    }

    pub fn with_complement(status: ChecklistStatus, complement: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            complement: Some(complement.into()),
        }
    }
}

/// A submitted checklist form
#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistSubmission {
    pub serial: Code,
    pub product_type: ProductType,
    pub order: Code,
    /// Responses keyed by item key
    #[serde(default)]
    pub responses: BTreeMap<String, ItemResponse>,
}

/// Submission rejected before anything was persisted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Responda todos os itens: {}", .missing.join(", "))]
pub struct ValidationError {
    /// Offending item keys, in question order
    pub missing: Vec<String>,
}

/// Question that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedItem {
    pub item_key: String,
    pub status: ChecklistStatus,
    pub complement: Option<String>,
}

/// Check every question of the template against the submission
///
/// Each question needs a status; questions that require a complement need an
/// acceptable one. Every offending key is reported, not just the first.
pub fn validate(
    template: &ChecklistTemplate,
    submission: &ChecklistSubmission,
) -> Result<Vec<ValidatedItem>, ValidationError> {
    let mut items = Vec::with_capacity(template.len());
    let mut missing = Vec::new();

    for question in &template.questions {
        let response = submission.responses.get(&question.item_key);
        let status = response.and_then(|r| r.status);
        // Questions without a complement drop whatever the client sent
        let complement = response
            .and_then(|r| r.complement.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty() && question.complement.is_required())
            .map(str::to_string);

        let complement_ok = !question.complement.is_required()
            || complement
                .as_deref()
                .is_some_and(|c| question.complement.accepts(c));

        match status {
            Some(status) if complement_ok => items.push(ValidatedItem {
                item_key: question.item_key.clone(),
                status,
                complement,
            }),
            _ => missing.push(question.item_key.clone()),
        }
    }

    for key in submission.responses.keys() {
        if template.question(key).is_none() {
            debug!("Ignoring response for unknown item {}", key);
        }
    }

    if missing.is_empty() {
        Ok(items)
    } else {
        Err(ValidationError { missing })
    }
}

/// Stored item label for a question
pub fn encode_item_key(item_key: &str, complement: Option<&str>, encoding: ComplementEncoding) -> String {
    match (encoding, complement) {
        (ComplementEncoding::InlineLabel, Some(c)) => format!("{} - {}", item_key, c),
        _ => item_key.to_string(),
    }
}

/// Turn validated items into one answer row per question
pub fn encode_answers(
    submission: &ChecklistSubmission,
    items: &[ValidatedItem],
    operator: &str,
    timestamp: DateTime<Utc>,
    encoding: ComplementEncoding,
) -> Vec<ChecklistAnswer> {
    items
        .iter()
        .map(|item| ChecklistAnswer {
            serial: submission.serial.clone(),
            product_type: submission.product_type,
            order: submission.order.clone(),
            item_key: encode_item_key(&item.item_key, item.complement.as_deref(), encoding),
            status: item.status,
            complement: match encoding {
                ComplementEncoding::InlineLabel => None,
                ComplementEncoding::SeparateField => item.complement.clone(),
            },
            operator: operator.to_string(),
            timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn complete(product_type: ProductType) -> ChecklistSubmission {
        let template = ChecklistTemplate::for_product(product_type);
        let responses = template
            .questions
            .iter()
            .map(|q| {
                let response = match q.item_key.as_str() {
                    "ITEM_4" => ItemResponse::with_complement(ChecklistStatus::Conforme, "Disco"),
                    "ITEM_7" => ItemResponse::with_complement(ChecklistStatus::Conforme, "Manual"),
                    "ITEM_11" => ItemResponse::with_complement(ChecklistStatus::Na, "2 caixas"),
                    "ITEM_12" | "ITEM_13" | "ITEM_14" => {
                        ItemResponse::with_complement(ChecklistStatus::Conforme, "Não")
                    }
                    "ITEM_15" => ItemResponse::with_complement(ChecklistStatus::NaoConforme, "3°"),
                    _ => ItemResponse::answered(ChecklistStatus::Conforme),
                };
                (q.item_key.clone(), response)
            })
            .collect();

        ChecklistSubmission {
            serial: Code::from("123456789"),
            product_type,
            order: Code::from("98765432109"),
            responses,
        }
    }

    #[test]
    fn test_complete_form_validates() {
        let template = ChecklistTemplate::for_product(ProductType::Manga);
        let items = validate(&template, &complete(ProductType::Manga)).unwrap();
        assert_eq!(items.len(), 15);
        assert_eq!(items[3].complement.as_deref(), Some("Disco"));
    }

    #[test]
    fn test_reports_every_missing_item() {
        let template = ChecklistTemplate::for_product(ProductType::Pnm);
        let mut submission = complete(ProductType::Pnm);
        submission.responses.remove("ITEM_2");
        submission.responses.insert("ITEM_9".to_string(), ItemResponse::default());
        submission.responses.insert(
            "ITEM_4".to_string(),
            ItemResponse::with_complement(ChecklistStatus::Conforme, "  "),
        );
        submission.responses.insert(
            "ITEM_12".to_string(),
            ItemResponse::answered(ChecklistStatus::Conforme),
        );

        let err = validate(&template, &submission).unwrap_err();
        assert_eq!(err.missing, vec!["ITEM_2", "ITEM_4", "ITEM_9", "ITEM_12"]);
        assert!(err.to_string().contains("ITEM_2, ITEM_4"));
    }

    #[test]
    fn test_choice_outside_options_is_missing() {
        let template = ChecklistTemplate::for_product(ProductType::Pnm);
        let mut submission = complete(ProductType::Pnm);
        submission.responses.insert(
            "ITEM_7".to_string(),
            ItemResponse::with_complement(ChecklistStatus::Conforme, "Hidráulica"),
        );

        let err = validate(&template, &submission).unwrap_err();
        assert_eq!(err.missing, vec!["ITEM_7"]);
    }

    #[test]
    fn test_manga_extra_question_is_required() {
        let template = ChecklistTemplate::for_product(ProductType::Manga);
        let mut submission = complete(ProductType::Manga);
        submission.responses.remove("ITEM_15");

        let err = validate(&template, &submission).unwrap_err();
        assert_eq!(err.missing, vec!["ITEM_15"]);
    }

    #[test]
    fn test_encoding_variants() {
        let template = ChecklistTemplate::for_product(ProductType::Pnm);
        let submission = complete(ProductType::Pnm);
        let items = validate(&template, &submission).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();

        let inline = encode_answers(&submission, &items, "ana", at, ComplementEncoding::InlineLabel);
        assert_eq!(inline.len(), 14);
        assert_eq!(inline[3].item_key, "ITEM_4 - Disco");
        assert_eq!(inline[3].complement, None);
        assert_eq!(inline[0].item_key, "ITEM_1");

        let separate = encode_answers(&submission, &items, "ana", at, ComplementEncoding::SeparateField);
        assert_eq!(separate[3].item_key, "ITEM_4");
        assert_eq!(separate[3].complement.as_deref(), Some("Disco"));
        assert!(separate.iter().all(|a| a.operator == "ana" && a.timestamp == at));
    }

    #[test]
    fn test_stray_complement_is_dropped() {
        let template = ChecklistTemplate::for_product(ProductType::Pnm);
        let mut submission = complete(ProductType::Pnm);
        submission.responses.insert(
            "ITEM_1".to_string(),
            ItemResponse::with_complement(ChecklistStatus::Conforme, "x"),
        );
        let items = validate(&template, &submission).unwrap();
        assert_eq!(items[0].complement, None);

        let at = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let inline = encode_answers(&submission, &items, "ana", at, ComplementEncoding::InlineLabel);
        assert_eq!(inline[0].item_key, "ITEM_1");
        assert_eq!(inline[0].complement, None);
    }
}
