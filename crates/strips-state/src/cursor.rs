//! Stream call bookkeeping: generator cursors and test answers.
//!
//! A generator bound to an input tuple is a stateful cursor. Pulling again
//! at a later level continues where the previous pull stopped, and an
//! output already yielded for that input tuple is never yielded twice.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strips_core::stream::{OutputIter, StreamKind};
use strips_core::{format_tuple, Object, PlanningError, Result, Stream};
use tracing::debug;

/// Identifies one stream instance: stream index and input tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub stream: usize,
    pub inputs: Vec<Object>,
}

impl InstanceKey {
    /// Create a new key.
    pub fn new(stream: usize, inputs: Vec<Object>) -> Self {
        Self { stream, inputs }
    }
}

/// Result of pulling a cursor once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// A fresh output tuple.
    Output(Vec<Object>),
    /// The sequence has no further outputs.
    Exhausted,
}

/// A generator positioned on one input tuple.
pub struct GeneratorCursor {
    /// Lazily opened output sequence.
    iter: Option<OutputIter>,
    /// Elements consumed from the sequence, duplicates included.
    position: usize,
    /// Distinct outputs in yield order.
    yielded: Vec<Vec<Object>>,
    seen: BTreeSet<Vec<Object>>,
    exhausted: bool,
    last_pulled_level: Option<usize>,
}

impl std::fmt::Debug for GeneratorCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorCursor")
            .field("position", &self.position)
            .field("yielded", &self.yielded.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl GeneratorCursor {
    fn new() -> Self {
        Self {
            iter: None,
            position: 0,
            yielded: Vec::new(),
            seen: BTreeSet::new(),
            exhausted: false,
            last_pulled_level: None,
        }
    }

    /// Distinct outputs yielded so far.
    pub fn yielded(&self) -> &[Vec<Object>] {
        &self.yielded
    }

    /// Returns true once the sequence ran dry.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Serializable view of a cursor, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorSummary {
    pub stream: String,
    pub inputs: Vec<String>,
    pub position: usize,
    pub yielded: usize,
    pub exhausted: bool,
}

/// Arena of generator cursors keyed by stream instance.
#[derive(Debug, Default)]
pub struct CursorArena {
    cursors: BTreeMap<InstanceKey, GeneratorCursor>,
    pulls: usize,
}

impl CursorArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of pulls performed.
    pub fn pulls(&self) -> usize {
        self.pulls
    }

    /// Cursor for an instance, if it was ever pulled.
    pub fn get(&self, key: &InstanceKey) -> Option<&GeneratorCursor> {
        self.cursors.get(key)
    }

    /// Returns true if the instance is known to have no further outputs.
    pub fn is_exhausted(&self, key: &InstanceKey) -> bool {
        self.cursors.get(key).is_some_and(|c| c.exhausted)
    }

    /// Returns true if the instance was pulled at the given level.
    pub fn pulled_at(&self, key: &InstanceKey, level: usize) -> bool {
        self.cursors
            .get(key)
            .is_some_and(|c| c.last_pulled_level == Some(level))
    }

    /// Pull the next distinct output of a generator instance.
    ///
    /// Outputs are type-checked against the stream's declared outputs.
    /// After `max_duplicate_skips` consecutive repeats the cursor is
    /// treated as exhausted.
    pub fn pull(
        &mut self,
        key: &InstanceKey,
        stream: &Stream,
        level: usize,
        max_duplicate_skips: usize,
    ) -> Result<Pull> {
        let StreamKind::Generator(open) = &stream.kind else {
            return Err(PlanningError::MalformedStream {
                stream: stream.name.clone(),
                message: "pulled as a generator but declared as a test".to_string(),
            });
        };

        let cursor = self
            .cursors
            .entry(key.clone())
            .or_insert_with(GeneratorCursor::new);
        cursor.last_pulled_level = Some(level);
        if cursor.exhausted {
            return Ok(Pull::Exhausted);
        }
        self.pulls += 1;

        let iter = cursor.iter.get_or_insert_with(|| open(&key.inputs));
        let mut skipped = 0;
        loop {
            let Some(outputs) = iter.next() else {
                debug!("stream '{}' exhausted on ({})", stream.name, format_tuple(&key.inputs));
                cursor.exhausted = true;
                cursor.iter = None;
                return Ok(Pull::Exhausted);
            };
            cursor.position += 1;
            stream.check_outputs(&key.inputs, &outputs)?;
            if cursor.seen.insert(outputs.clone()) {
                cursor.yielded.push(outputs.clone());
                return Ok(Pull::Output(outputs));
            }
            skipped += 1;
            if skipped > max_duplicate_skips {
                debug!(
                    "stream '{}' repeated itself {} times on ({}), treating as exhausted",
                    stream.name,
                    skipped,
                    format_tuple(&key.inputs)
                );
                cursor.exhausted = true;
                cursor.iter = None;
                return Ok(Pull::Exhausted);
            }
        }
    }

    /// Pull the next output, reporting exhaustion as an error.
    pub fn next_output(
        &mut self,
        key: &InstanceKey,
        stream: &Stream,
        level: usize,
        max_duplicate_skips: usize,
    ) -> Result<Vec<Object>> {
        match self.pull(key, stream, level, max_duplicate_skips)? {
            Pull::Output(outputs) => Ok(outputs),
            Pull::Exhausted => Err(PlanningError::StreamExhausted {
                stream: stream.name.clone(),
                inputs: format_tuple(&key.inputs),
            }),
        }
    }

    /// Summaries of every cursor, in instance order.
    pub fn summaries(&self, streams: &[Stream]) -> Vec<CursorSummary> {
        self.cursors
            .iter()
            .map(|(key, cursor)| CursorSummary {
                stream: streams
                    .get(key.stream)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                inputs: key.inputs.iter().map(ToString::to_string).collect(),
                position: cursor.position,
                yielded: cursor.yielded.len(),
                exhausted: cursor.exhausted,
            })
            .collect()
    }
}

/// Memoized answers of test streams.
#[derive(Debug, Default)]
pub struct TestMemo {
    answers: BTreeMap<InstanceKey, bool>,
    calls: usize,
}

impl TestMemo {
    /// Create an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of test function calls made.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Memoized answer, if the instance was evaluated.
    pub fn get(&self, key: &InstanceKey) -> Option<bool> {
        self.answers.get(key).copied()
    }

    /// Number of evaluated instances.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Returns true if nothing was evaluated yet.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Evaluate a test instance once and remember the answer.
    ///
    /// With `verify` set, the first evaluation calls the test twice and
    /// rejects differing answers.
    pub fn evaluate(&mut self, key: &InstanceKey, stream: &Stream, verify: bool) -> Result<bool> {
        if let Some(answer) = self.answers.get(key) {
            return Ok(*answer);
        }
        let StreamKind::Test(test) = &stream.kind else {
            return Err(PlanningError::MalformedStream {
                stream: stream.name.clone(),
                message: "evaluated as a test but declared as a generator".to_string(),
            });
        };

        let answer = test(&key.inputs);
        self.calls += 1;
        if verify {
            self.calls += 1;
            if test(&key.inputs) != answer {
                return Err(PlanningError::NonDeterministicStream {
                    stream: stream.name.clone(),
                    inputs: format_tuple(&key.inputs),
                });
            }
        }
        self.answers.insert(key.clone(), answer);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use strips_core::Type;

    fn pose_stream(values: Vec<i64>) -> Stream {
        let pose = Type::new("POSE");
        let ty = pose.clone();
        Stream::builder("poses")
            .output(pose.param("P"))
            .generator(move |_| {
                let ty = ty.clone();
                values.clone().into_iter().map(move |v| vec![ty.object(v)])
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_cursor_resumes() {
        let stream = pose_stream(vec![0, 1, 2]);
        let key = InstanceKey::new(0, vec![]);
        let mut arena = CursorArena::new();

        let first = arena.next_output(&key, &stream, 0, 8).unwrap();
        let second = arena.next_output(&key, &stream, 1, 8).unwrap();
        assert_ne!(first, second);
        assert!(arena.pulled_at(&key, 1));
        assert!(!arena.pulled_at(&key, 0));
        assert_eq!(arena.get(&key).unwrap().yielded().len(), 2);

        arena.next_output(&key, &stream, 2, 8).unwrap();
        let err = arena.next_output(&key, &stream, 3, 8).unwrap_err();
        assert!(matches!(err, PlanningError::StreamExhausted { .. }));
        assert!(arena.is_exhausted(&key));
    }

    #[test]
    fn test_no_duplicate_outputs() {
        let stream = pose_stream(vec![1, 1, 2, 1, 2]);
        let key = InstanceKey::new(0, vec![]);
        let mut arena = CursorArena::new();

        assert_eq!(
            arena.pull(&key, &stream, 0, 8).unwrap(),
            Pull::Output(vec![Type::new("POSE").object(1)])
        );
        assert_eq!(
            arena.pull(&key, &stream, 0, 8).unwrap(),
            Pull::Output(vec![Type::new("POSE").object(2)])
        );
        assert_eq!(arena.pull(&key, &stream, 0, 8).unwrap(), Pull::Exhausted);

        let summary = &arena.summaries(&[stream])[0];
        assert_eq!(summary.position, 5);
        assert_eq!(summary.yielded, 2);
        assert!(summary.exhausted);
    }

    #[test]
    fn test_repeating_generator_is_cut_off() {
        let stream = pose_stream(vec![7; 100]);
        let key = InstanceKey::new(0, vec![]);
        let mut arena = CursorArena::new();
        arena.next_output(&key, &stream, 0, 4).unwrap();
        assert_eq!(arena.pull(&key, &stream, 0, 4).unwrap(), Pull::Exhausted);
    }

    #[test]
    fn test_wrong_output_type_is_fatal() {
        let conf = Type::new("CONF");
        let stream = Stream::builder("bad")
            .output(Type::new("POSE").param("P"))
            .generator(move |_| vec![vec![conf.object(0)]])
            .build()
            .unwrap();
        let mut arena = CursorArena::new();
        let err = arena
            .pull(&InstanceKey::new(0, vec![]), &stream, 0, 8)
            .unwrap_err();
        assert!(matches!(err, PlanningError::TypeMismatch { .. }));
    }

    #[test]
    fn test_memoized_tests() {
        let pose = Type::new("POSE");
        let stream = Stream::builder("distinct")
            .inputs([pose.param("P1"), pose.param("P2")])
            .test(|inputs| inputs[0] != inputs[1])
            .build()
            .unwrap();
        let mut memo = TestMemo::new();
        let key = InstanceKey::new(0, vec![pose.object(0), pose.object(1)]);

        assert!(memo.evaluate(&key, &stream, true).unwrap());
        assert!(memo.evaluate(&key, &stream, true).unwrap());
        assert_eq!(memo.calls(), 2);
        assert_eq!(memo.get(&key), Some(true));
    }

    #[test]
    fn test_non_deterministic_test_detected() {
        let flip = Arc::new(AtomicBool::new(false));
        let state = flip.clone();
        let stream = Stream::builder("coin")
            .test(move |_| !state.fetch_xor(true, Ordering::SeqCst))
            .build()
            .unwrap();
        let mut memo = TestMemo::new();
        let err = memo
            .evaluate(&InstanceKey::new(0, vec![]), &stream, true)
            .unwrap_err();
        assert!(matches!(err, PlanningError::NonDeterministicStream { .. }));
    }
}
