//! Loop/Exit Lists
//!
//! An ordered list of values with two marked positions: `loop` (index to
//! return to while a note is held past the list end) and `exit` (start of the
//! release tail, played once after note-off). The same marked-list grammar
//! describes instrument envelopes (volume and pitch over time) and play
//! sequences (pattern order over the song), so the marker rules live in one
//! shared parser:
//!
//! - at most one `Loop` marker
//! - at most one `Exit` marker, and only after `Loop`
//!
//! Because `Exit` can only follow `Loop`, every parsed list satisfies
//! `exit >= loop` by construction.

use crate::{GvsongError, Result};

/// One token of a Loop/Exit List description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListToken<T> {
    /// A plain list value.
    Value(T),
    /// Marks the position a held note returns to.
    Loop,
    /// Marks the start of the release tail.
    Exit,
}

/// A marked list with the marker positions resolved (`None` = unspecified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedList<T> {
    /// The plain values, markers stripped.
    pub values: Vec<T>,
    /// Position of the `Loop` marker, if present.
    pub loop_index: Option<usize>,
    /// Position of the `Exit` marker, if present.
    pub exit_index: Option<usize>,
}

/// Parse a token list, enforcing the marker rules.
pub fn parse_marked_list<T: Copy>(tokens: &[ListToken<T>]) -> Result<MarkedList<T>> {
    let mut values = Vec::new();
    let mut loop_index = None;
    let mut exit_index = None;
    for token in tokens {
        match token {
            ListToken::Value(v) => values.push(*v),
            ListToken::Loop => {
                if loop_index.is_some() {
                    return Err(GvsongError::Build(
                        "cannot define multiple LOOP markers".into(),
                    ));
                }
                if exit_index.is_some() {
                    return Err(GvsongError::Build("LOOP marker must precede EXIT".into()));
                }
                loop_index = Some(values.len());
            }
            ListToken::Exit => {
                if exit_index.is_some() {
                    return Err(GvsongError::Build(
                        "cannot define multiple EXIT markers".into(),
                    ));
                }
                if loop_index.is_none() {
                    return Err(GvsongError::Build(
                        "EXIT marker requires a preceding LOOP".into(),
                    ));
                }
                exit_index = Some(values.len());
            }
        }
    }
    Ok(MarkedList {
        values,
        loop_index,
        exit_index,
    })
}

/// An instrument envelope: signed 8-bit values stepped once per frame, with
/// held-note looping over `loop..exit` and a release tail from `exit` to the
/// end of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    values: Vec<i8>,
    loop_index: u8,
    exit_index: u8,
}

impl Envelope {
    /// Parse and normalize an envelope description.
    ///
    /// Values must lie in `low..=high`. The list is implicitly
    /// zero-terminated: if it does not already end in 0, one is appended.
    /// When no `Exit` marker is given, `exit` defaults to the final index
    /// (the terminating zero); when no `Loop` marker is given, `loop`
    /// defaults to `exit`. Normalized length must fit in 255 entries.
    pub fn from_tokens(tokens: &[ListToken<i32>], low: i32, high: i32) -> Result<Envelope> {
        let parsed = parse_marked_list(tokens)?;
        let mut values = Vec::with_capacity(parsed.values.len() + 1);
        for v in parsed.values {
            if v < low || v > high {
                return Err(GvsongError::Build(format!(
                    "envelope value out of range {}..{}: {}",
                    low, high, v
                )));
            }
            values.push(v as i8);
        }
        if values.last().copied() != Some(0) {
            values.push(0);
        }
        if values.len() > 255 {
            return Err(GvsongError::Build(
                "envelope too large; max length of 255".into(),
            ));
        }
        let loop_index = parsed.loop_index;
        let exit_index = match parsed.exit_index {
            Some(e) => e,
            // Default to the terminating zero, but never before an explicit
            // loop point.
            None => (values.len() - 1).max(loop_index.unwrap_or(0)),
        };
        let loop_index = loop_index.unwrap_or(exit_index);
        if loop_index > exit_index || exit_index >= values.len() {
            return Err(GvsongError::Build(format!(
                "envelope markers out of range: loop {} exit {} length {}",
                loop_index,
                exit_index,
                values.len()
            )));
        }
        Ok(Envelope {
            values,
            loop_index: loop_index as u8,
            exit_index: exit_index as u8,
        })
    }

    /// Assemble an envelope from already-validated parts (decoded data).
    pub(crate) fn from_raw(values: Vec<i8>, loop_index: u8, exit_index: u8) -> Envelope {
        Envelope {
            values,
            loop_index,
            exit_index,
        }
    }

    /// The envelope values.
    pub fn values(&self) -> &[i8] {
        &self.values
    }

    /// Index a held note returns to when reaching `exit`.
    pub fn loop_index(&self) -> u8 {
        self.loop_index
    }

    /// Index where the release tail begins.
    pub fn exit_index(&self) -> u8 {
        self.exit_index
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the envelope holds no values (only possible for hostile
    /// decoded data; the builder always zero-terminates).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
