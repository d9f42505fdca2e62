// src/extractors/ner.rs
//! Token-classification tagger: runs a pretrained NER checkpoint exported to
//! ONNX and merges its per-token BIO tags into entity spans.
use crate::extractors::entities::{EntityLabel, EntityTagger, TaggedEntity};
use crate::model::{CHECKPOINT_CONFIG, CHECKPOINT_FILES, CHECKPOINT_TOKENIZER, CHECKPOINT_WEIGHTS};
use crate::utils::error::ExtractError;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};

/// Encoder input limit of BERT-style checkpoints
const MAX_TOKENS: usize = 512;
/// Text is fed to the model in pieces of at most this many bytes, which
/// keeps each piece well inside `MAX_TOKENS`
const MAX_CHUNK_BYTES: usize = 1200;

/// The parts of a Hugging Face `config.json` the tagger reads.
#[derive(Debug, Deserialize)]
struct CheckpointConfig {
    #[serde(default, rename = "_name_or_path")]
    name_or_path: Option<String>,
    id2label: HashMap<String, String>,
}

/// One model token with its predicted tag and byte span in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTag {
    pub tag: String,
    pub start: usize,
    pub end: usize,
}

pub struct TransformerTagger {
    name: String,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    wants_type_ids: bool,
}

fn inference_error<E: fmt::Display>(e: E) -> ExtractError {
    ExtractError::Inference(e.to_string())
}

fn weights_error<E: fmt::Display>(e: E) -> ExtractError {
    ExtractError::InvalidModel(format!("{}: {}", CHECKPOINT_WEIGHTS, e))
}

/// Turns `id2label` into a label table indexed by class id.
fn label_table(config_json: &str) -> Result<(Option<String>, Vec<String>), ExtractError> {
    let config: CheckpointConfig = serde_json::from_str(config_json)
        .map_err(|e| ExtractError::InvalidModel(format!("{}: {}", CHECKPOINT_CONFIG, e)))?;

    let mut labels = vec![None; config.id2label.len()];
    for (id, label) in config.id2label {
        let index = id
            .parse::<usize>()
            .ok()
            .filter(|&i| i < labels.len())
            .ok_or_else(|| ExtractError::InvalidModel(format!("id2label has stray class id '{}'", id)))?;
        labels[index] = Some(label);
    }

    let labels = labels
        .into_iter()
        .collect::<Option<Vec<String>>>()
        .ok_or_else(|| ExtractError::InvalidModel("id2label class ids are not contiguous".to_string()))?;
    if labels.is_empty() {
        return Err(ExtractError::InvalidModel("id2label is empty".to_string()));
    }
    Ok((config.name_or_path, labels))
}

impl TransformerTagger {
    /// Loads `model.onnx`, `tokenizer.json` and `config.json` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, ExtractError> {
        if let Some(missing) = CHECKPOINT_FILES.iter().map(|f| dir.join(f)).find(|p| !p.is_file()) {
            return Err(ExtractError::InvalidModel(format!("missing {}", missing.display())));
        }

        let config_json = std::fs::read_to_string(dir.join(CHECKPOINT_CONFIG))
            .map_err(|e| ExtractError::InvalidModel(format!("{}: {}", CHECKPOINT_CONFIG, e)))?;
        let (config_name, labels) = label_table(&config_json)?;

        let mut tokenizer = Tokenizer::from_file(dir.join(CHECKPOINT_TOKENIZER))
            .map_err(|e| ExtractError::InvalidModel(format!("{}: {}", CHECKPOINT_TOKENIZER, e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| ExtractError::InvalidModel(format!("{}: {}", CHECKPOINT_TOKENIZER, e)))?;

        let session = Session::builder()
            .map_err(weights_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(weights_error)?
            .with_intra_threads(4)
            .map_err(weights_error)?
            .commit_from_file(dir.join(CHECKPOINT_WEIGHTS))
            .map_err(weights_error)?;

        let wants_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");
        let name = config_name
            .filter(|n| !n.is_empty())
            .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "transformer".to_string());

        tracing::info!(
            "Loaded NER checkpoint '{}' ({} labels, {} inputs)",
            name,
            labels.len(),
            session.inputs.len()
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            tokenizer,
            labels,
            wants_type_ids,
        })
    }

    /// Runs the model over one piece of text. Offsets in the result are
    /// shifted by `base` so they point into the whole document.
    fn tag_chunk(&self, chunk: &str, base: usize) -> Result<Vec<TokenTag>, ExtractError> {
        let encoding = self.tokenizer.encode(chunk, true).map_err(inference_error)?;
        let len = encoding.get_ids().len();
        if len == 0 {
            return Ok(Vec::new());
        }

        let as_tensor = |values: &[u32]| {
            let data: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
            Tensor::from_array(([1_usize, len], data.into_boxed_slice())).map_err(inference_error)
        };
        let input_ids = as_tensor(encoding.get_ids())?;
        let attention_mask = as_tensor(encoding.get_attention_mask())?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ExtractError::Inference("model session lock poisoned".to_string()))?;
        let outputs = if self.wants_type_ids {
            let token_type_ids = as_tensor(encoding.get_type_ids())?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
        }
        .map_err(inference_error)?;
        let (shape, logits) = outputs[0].try_extract_tensor::<f32>().map_err(inference_error)?;

        // [batch, tokens, labels]
        let num_labels = if shape.len() == 3 { shape[2] as usize } else { 0 };
        if num_labels != self.labels.len() || logits.len() < len * num_labels {
            return Err(ExtractError::Inference(format!(
                "unexpected logits shape {:?} for {} tokens and {} labels",
                shape,
                len,
                self.labels.len()
            )));
        }

        let special = encoding.get_special_tokens_mask();
        let tags = encoding
            .get_offsets()
            .iter()
            .enumerate()
            .filter(|(i, (start, end))| special.get(*i) != Some(&1) && start < end)
            .filter_map(|(i, &(start, end))| {
                let row = &logits[i * num_labels..(i + 1) * num_labels];
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(class, _)| class)?;
                Some(TokenTag {
                    tag: self.labels[best].clone(),
                    start: base + start,
                    end: base + end,
                })
            })
            .collect();
        Ok(tags)
    }
}

impl EntityTagger for TransformerTagger {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self, text: &str) -> Result<Vec<TaggedEntity>, ExtractError> {
        let mut tags = Vec::new();
        for (start, end) in chunk_bounds(text, MAX_CHUNK_BYTES) {
            tags.extend(self.tag_chunk(&text[start..end], start)?);
        }
        let entities = merge_token_tags(text, &tags);
        tracing::debug!("Tagged {} entities from {} tokens", entities.len(), tags.len());
        Ok(entities)
    }
}

/// Splits `text` into consecutive byte ranges of at most `max_bytes`,
/// breaking after a newline where possible and otherwise after whitespace.
/// A single word longer than `max_bytes` becomes its own range.
pub fn chunk_bounds(text: &str, max_bytes: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for line in text.split_inclusive('\n') {
        let pieces: Vec<&str> = if line.len() > max_bytes {
            line.split_inclusive(char::is_whitespace).collect()
        } else {
            vec![line]
        };
        for piece in pieces {
            if end > start && end - start + piece.len() > max_bytes {
                bounds.push((start, end));
                start = end;
            }
            end += piece.len();
        }
    }
    if end > start {
        bounds.push((start, end));
    }
    bounds
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagPosition {
    Begin,
    Inside,
    Outside,
}

fn tag_position(tag: &str) -> TagPosition {
    let tag = tag.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case("O") {
        return TagPosition::Outside;
    }
    match tag.split_once('-').map(|(prefix, _)| prefix) {
        Some("B") | Some("S") | Some("U") => TagPosition::Begin,
        // I-, E-, L- and bare labels all continue a running span
        _ => TagPosition::Inside,
    }
}

/// Merges per-token BIO/BIOES tags into entity spans over `text`.
///
/// An `I-` token continues a span of the same label and otherwise starts
/// one. A `B-` token that starts exactly where the previous token of the
/// same label ended is a word piece and continues it too.
pub fn merge_token_tags(text: &str, tags: &[TokenTag]) -> Vec<TaggedEntity> {
    let mut entities = Vec::new();
    let mut current: Option<(EntityLabel, usize, usize)> = None;

    for token in tags {
        let position = tag_position(&token.tag);
        if position == TagPosition::Outside {
            close_span(text, current.take(), &mut entities);
            continue;
        }

        let label = EntityLabel::from_tag(&token.tag);
        let continues = match &current {
            Some((open, _, end)) if *open == label => {
                position == TagPosition::Inside || *end == token.start
            }
            _ => false,
        };

        if continues {
            if let Some(span) = current.as_mut() {
                span.2 = token.end;
            }
        } else {
            close_span(text, current.take(), &mut entities);
            current = Some((label, token.start, token.end));
        }
    }
    close_span(text, current.take(), &mut entities);
    entities
}

fn close_span(text: &str, span: Option<(EntityLabel, usize, usize)>, entities: &mut Vec<TaggedEntity>) {
    let Some((label, start, end)) = span else {
        return;
    };
    let Some(raw) = text.get(start..end) else {
        return;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    entities.push(TaggedEntity {
        label,
        text: trimmed.to_string(),
        start: start + lead,
        end: start + lead + trimmed.len(),
    });
}
