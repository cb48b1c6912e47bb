//! Node name formatting
//!
//! A layer with N instances is written as N distinct DAGMan nodes. The
//! formatter maps `(layer name, instance index)` to the node name used in the
//! DAG file, and parses those names back when reading rescue files.

use crate::error::{DagError, Result};

/// Invertible mapping between layer instances and DAG node names.
pub trait NodeNameFormatter {
    /// Build the node name for instance `index` of `layer`.
    fn generate(&self, layer: &str, index: usize) -> Result<String>;

    /// Recover the `(layer, index)` pair from a node name.
    fn parse(&self, text: &str) -> Result<(String, usize)>;
}

/// `<layer><separator><index + offset>`, optionally zero padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFormatter {
    separator: String,
    index_width: usize,
    offset: i64,
}

impl Default for SimpleFormatter {
    fn default() -> Self {
        Self {
            separator: ":".to_string(),
            index_width: 0,
            offset: 0,
        }
    }
}

impl SimpleFormatter {
    pub const DEFAULT_SEPARATOR: &'static str = ":";

    pub fn new(separator: impl Into<String>, index_width: usize, offset: i64) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(DagError::InvalidFormatter {
                details: "separator cannot be empty".to_string(),
            });
        }
        if separator.chars().any(char::is_whitespace) {
            return Err(DagError::InvalidFormatter {
                details: format!("separator '{separator}' contains whitespace"),
            });
        }
        Ok(Self {
            separator,
            index_width,
            offset,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl NodeNameFormatter for SimpleFormatter {
    fn generate(&self, layer: &str, index: usize) -> Result<String> {
        if layer.contains(&self.separator) {
            return Err(DagError::LayerNameContainsSeparator {
                layer: layer.to_string(),
                separator: self.separator.clone(),
            });
        }

        let shown = i64::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(self.offset))
            .ok_or_else(|| DagError::CannotInvertFormat {
                text: format!("{layer}{}{index}", self.separator),
                details: format!("index {index} plus offset {} overflows", self.offset),
            })?;
        let text = format!(
            "{layer}{sep}{shown:0width$}",
            sep = self.separator,
            width = self.index_width
        );

        match self.parse(&text) {
            Ok((l, i)) if l == layer && i == index => Ok(text),
            Ok((l, i)) => Err(DagError::CannotInvertFormat {
                details: format!("parsed back as ('{l}', {i}) instead of ('{layer}', {index})"),
                text,
            }),
            Err(DagError::CannotInvertFormat { details, .. }) => {
                Err(DagError::CannotInvertFormat { text, details })
            }
            Err(e) => Err(e),
        }
    }

    fn parse(&self, text: &str) -> Result<(String, usize)> {
        let invalid = |details: String| DagError::CannotInvertFormat {
            text: text.to_string(),
            details,
        };

        let (layer, index) = text
            .split_once(&self.separator)
            .ok_or_else(|| invalid(format!("missing separator '{}'", self.separator)))?;

        let shown: i64 = index
            .parse()
            .map_err(|_| invalid(format!("'{index}' is not an integer index")))?;
        let index = shown.checked_sub(self.offset).ok_or_else(|| {
            invalid(format!("index {shown} minus offset {} overflows", self.offset))
        })?;
        let index = usize::try_from(index)
            .map_err(|_| invalid(format!("index {index} is negative after removing offset")))?;

        Ok((layer.to_string(), index))
    }
}
