//! Checklist question set
//!
//! Item keys are positional (`ITEM_n`) and never derived from the wording, so
//! answers stay comparable when a question is reworded.

use crate::model::ProductType;
use serde::Serialize;

/// Yes/no complement options
pub const YES_NO: &[&str] = &["Sim", "Não"];

/// Extra information a question requires besides its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "options", rename_all = "snake_case")]
pub enum ComplementKind {
    None,
    /// One value out of a fixed option set
    Choice(&'static [&'static str]),
    FreeText,
    YesNo,
}

impl ComplementKind {
    pub fn is_required(&self) -> bool {
        !matches!(self, ComplementKind::None)
    }

    /// Whether `value` is an acceptable complement
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            ComplementKind::None => true,
            ComplementKind::FreeText => !value.is_empty(),
            ComplementKind::Choice(options) => options.contains(&value),
            ComplementKind::YesNo => YES_NO.contains(&value),
        }
    }
}

/// One checklist question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub item_key: String,
    pub label: &'static str,
    pub complement: ComplementKind,
}

const BASE_QUESTIONS: &[(&str, ComplementKind)] = &[
    ("Etiqueta do produto conforme?", ComplementKind::None),
    ("Placa do Inmetro conforme?", ComplementKind::None),
    ("Etiqueta ABS conforme?", ComplementKind::None),
    ("Rodagem correta?", ComplementKind::Choice(&["Disco", "Tambor"])),
    ("Graxeiras e anéis ok?", ComplementKind::None),
    ("Sistema de atuação correto?", ComplementKind::None),
    ("Catraca correta?", ComplementKind::Choice(&["Manual", "Automática"])),
    ("Tampa do cubo conforme?", ComplementKind::None),
    ("Pintura do eixo conforme?", ComplementKind::None),
    ("Solda conforme?", ComplementKind::None),
    ("Caixas corretas?", ComplementKind::FreeText),
    ("Etiqueta pede suspensor?", ComplementKind::YesNo),
    ("Etiqueta pede suporte bolsa?", ComplementKind::YesNo),
    ("Etiqueta pede mão francesa?", ComplementKind::YesNo),
];

const MANGA_QUESTION: (&str, ComplementKind) =
    ("Grau do Manga conforme etiqueta?", ComplementKind::FreeText);

/// Ordered question list for one product type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistTemplate {
    pub product_type: ProductType,
    pub questions: Vec<Question>,
}

impl ChecklistTemplate {
    /// Base questions, plus the spindle-degree check for MANGA
    pub fn for_product(product_type: ProductType) -> Self {
        let mut entries: Vec<(&'static str, ComplementKind)> = BASE_QUESTIONS.to_vec();
        if product_type == ProductType::Manga {
            entries.push(MANGA_QUESTION);
        }

        let questions = entries
            .into_iter()
            .enumerate()
            .map(|(i, (label, complement))| Question {
                item_key: item_key(i + 1),
                label,
                complement,
            })
            .collect();

        Self { product_type, questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, item_key: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.item_key == item_key)
    }
}

/// Stable key of the n-th question (1-based)
pub fn item_key(position: usize) -> String {
    format!("ITEM_{}", position)
}
