//! Match Engine: compiles the optional display/admission filter once
//! at startup and evaluates it on the hot path without re-parsing.

use std::sync::Arc;

use regex::RegexBuilder;

use crate::config::MatchOptions;
use crate::error::{CoreError, CoreResult};

/// A compiled match expression plus its invert/case modifiers.
#[derive(Clone)]
pub struct MatchEngine {
    regex: Option<Arc<regex::Regex>>,
    invert: bool,
}

impl MatchEngine {
    /// Compiles `opts.mexpr`, if set. Fails with [`CoreError::RegexCompile`]
    /// when the expression does not parse.
    pub fn init(opts: &MatchOptions) -> CoreResult<Self> {
        let regex = match &opts.mexpr {
            None => None,
            Some(expr) => {
                let compiled = RegexBuilder::new(expr)
                    .case_insensitive(opts.micase)
                    .multi_line(true)
                    .build()
                    .map_err(|e| CoreError::regex_compile(expr.clone(), e.to_string()))?;
                Some(Arc::new(compiled))
            }
        };
        Ok(MatchEngine {
            regex,
            invert: opts.minvert,
        })
    }

    /// True iff `payload` passes the filter: match success XOR `minvert`,
    /// always true when no expression is configured.
    pub fn check(&self, payload: &[u8]) -> bool {
        match &self.regex {
            None => true,
            Some(re) => {
                let text = String::from_utf8_lossy(payload);
                re.is_match(&text) ^ self.invert
            }
        }
    }
}
