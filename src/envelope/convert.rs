use super::{Envelope, EnvelopeKind, RichText};

/// Target shapes reachable through the coercion table.
pub trait FromEnvelope: Sized {
    const KIND: EnvelopeKind;

    /// `None` when the source shape has no mapping to `Self`.
    fn from_envelope(envelope: &Envelope) -> Option<Self>;
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_string).collect()
}

impl FromEnvelope for String {
    const KIND: EnvelopeKind = EnvelopeKind::Text;

    fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope {
            Envelope::Text(text) => Some(text.clone()),
            Envelope::Column(items) => Some(items.join("\n")),
            Envelope::ColumnList(columns) => Some(columns.concat().join("\n")),
            Envelope::RichText(rich) => Some(rich.result_text.clone()),
        }
    }
}

impl FromEnvelope for Vec<String> {
    const KIND: EnvelopeKind = EnvelopeKind::Column;

    fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope {
            Envelope::Text(text) => Some(split_lines(text)),
            Envelope::Column(items) => Some(items.clone()),
            Envelope::ColumnList(columns) => Some(columns.concat()),
            Envelope::RichText(rich) => Some(split_lines(&rich.result_text)),
        }
    }
}

impl FromEnvelope for Vec<Vec<String>> {
    const KIND: EnvelopeKind = EnvelopeKind::ColumnList;

    fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope {
            Envelope::Column(items) => Some(items.iter().map(|item| split_lines(item)).collect()),
            Envelope::ColumnList(columns) => Some(columns.clone()),
            Envelope::Text(_) | Envelope::RichText(_) => None,
        }
    }
}

impl FromEnvelope for RichText {
    const KIND: EnvelopeKind = EnvelopeKind::RichText;

    fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope {
            Envelope::RichText(rich) => Some(rich.clone()),
            _ => None,
        }
    }
}
