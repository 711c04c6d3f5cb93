// Sequential display numbering for the final report body

use super::ledger::CitationLedger;
use super::markers::splice;
use crate::models::CitationEntry;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use tracing::warn;

/// What a marker in stage output refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CitationKey {
    /// A ledger global id
    Resolved(u32),
    /// A label no ledger entry backs; kept verbatim
    Unresolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerOccurrence {
    /// Byte range of the label digits inside the text
    pub span: Range<usize>,
    pub key: CitationKey,
}

/// Text plus the citation occurrences found in it, in reading order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedText {
    pub text: String,
    pub occurrences: Vec<MarkerOccurrence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStatus {
    Resolved,
    Unresolved,
}

/// One line of the final reference list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    /// Label as it appears in the body (`"1"`.. for resolved entries)
    pub label: String,
    pub status: ReferenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CitationEntry>,
}

/// Non-fatal: a marker in generated text matched no recorded citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationResolutionWarning {
    pub label: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Renumbered {
    pub text: String,
    /// Same keys as the input, spans moved to the renumbered text
    pub occurrences: Vec<MarkerOccurrence>,
    pub references: Vec<Reference>,
    pub warnings: Vec<CitationResolutionWarning>,
}

impl Renumbered {
    /// Feed the output back in as input; renumbering it again is a no-op.
    pub fn into_marked(self) -> MarkedText {
        MarkedText {
            text: self.text,
            occurrences: self.occurrences,
        }
    }
}

impl CitationLedger {
    /// Assign display numbers 1..N by first appearance, rewrite every
    /// resolved marker and build the matching reference list.
    ///
    /// Unresolved markers keep their text and are appended to the
    /// reference list with status `unresolved`. Pure over its input and
    /// the (read-only) ledger, so applying it to its own output changes
    /// nothing.
    pub fn renumber(&self, input: &MarkedText) -> Renumbered {
        let mut ordered: Vec<&MarkerOccurrence> = input.occurrences.iter().collect();
        ordered.sort_by_key(|o| o.span.start);

        let mut numbers: HashMap<u32, u32> = HashMap::new();
        let mut resolved: Vec<Reference> = Vec::new();
        let mut unresolved: Vec<Reference> = Vec::new();
        let mut warnings = Vec::new();
        let mut replacements = Vec::with_capacity(ordered.len());

        for occurrence in &ordered {
            let display = match &occurrence.key {
                CitationKey::Resolved(id) => match self.entry(*id) {
                    Some(entry) => {
                        let next = numbers.len() as u32 + 1;
                        let number = *numbers.entry(*id).or_insert_with(|| {
                            resolved.push(Reference {
                                label: next.to_string(),
                                status: ReferenceStatus::Resolved,
                                entry: Some(entry),
                            });
                            next
                        });
                        number.to_string()
                    }
                    None => {
                        let label = id.to_string();
                        note_unresolved(&label, &mut unresolved, &mut warnings);
                        input.text[occurrence.span.clone()].to_string()
                    }
                },
                CitationKey::Unresolved(label) => {
                    note_unresolved(label, &mut unresolved, &mut warnings);
                    input.text[occurrence.span.clone()].to_string()
                }
            };
            replacements.push((occurrence.span.clone(), display));
        }

        let (text, spans) = splice(&input.text, &replacements);
        let occurrences = ordered
            .into_iter()
            .zip(spans)
            .map(|(o, span)| MarkerOccurrence {
                span,
                key: o.key.clone(),
            })
            .collect();

        resolved.extend(unresolved);
        Renumbered {
            text,
            occurrences,
            references: resolved,
            warnings,
        }
    }
}

fn note_unresolved(
    label: &str,
    unresolved: &mut Vec<Reference>,
    warnings: &mut Vec<CitationResolutionWarning>,
) {
    if unresolved.iter().any(|r| r.label == label) {
        return;
    }
    warn!(label, "Citation marker has no recorded source");
    unresolved.push(Reference {
        label: label.to_string(),
        status: ReferenceStatus::Unresolved,
        entry: None,
    });
    warnings.push(CitationResolutionWarning {
        label: label.to_string(),
        message: format!("marker [{}] does not match any recorded citation", label),
    });
}
