//! Splitting a streamed response into two display regions.
//!
//! A streamed answer such as a journal excerpt followed by a reflection is
//! divided at the first occurrence of a fixed marker. Everything before the
//! marker is the primary region; the marker and everything after it is the
//! secondary region. Both regions are available after every fragment so the
//! caller can redraw them.
//!
//! Rules:
//! - Only the first occurrence of the marker splits. Later occurrences stay
//!   inside the secondary region as plain text.
//! - Once split, the primary region is frozen and trimmed of surrounding
//!   whitespace. Before the split it is the raw accumulated text.
//! - A marker straddling fragment boundaries is found as soon as its last
//!   byte arrives; the result is the same as rescanning the whole buffer.
//! - A marker that never appears leaves the secondary region empty.

use futures::{Stream, StreamExt};
use quill_common::Result;
use serde::Serialize;

/// Borrowed view of both regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions<'a> {
    pub primary: &'a str,
    pub secondary: &'a str,
}

impl Regions<'_> {
    pub fn to_snapshot(&self) -> RegionSnapshot {
        RegionSnapshot {
            primary: self.primary.to_string(),
            secondary: self.secondary.to_string(),
        }
    }
}

/// Owned copy of both regions, sent to clients after each fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionSnapshot {
    pub primary: String,
    pub secondary: String,
}

/// Final state once the stream has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitOutcome {
    /// Concatenation of every fragment.
    pub full: String,
    pub primary: String,
    pub secondary: String,
    pub marker_found: bool,
}

#[derive(Debug)]
enum SplitState {
    Scanning,
    Split { primary: String, secondary: String },
}

#[derive(Debug)]
pub struct StreamSplitter {
    marker: String,
    buffer: String,
    state: SplitState,
}

impl StreamSplitter {
    /// Split on `marker`. An empty marker never matches.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            buffer: String::new(),
            state: SplitState::Scanning,
        }
    }

    /// A splitter that keeps everything in the primary region.
    pub fn unmarked() -> Self {
        Self::new(String::new())
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_split(&self) -> bool {
        matches!(self.state, SplitState::Split { .. })
    }

    /// Everything received so far.
    pub fn full_text(&self) -> &str {
        &self.buffer
    }

    /// Append one fragment and return the updated regions.
    pub fn push(&mut self, fragment: &str) -> Regions<'_> {
        let previous_len = self.buffer.len();
        self.buffer.push_str(fragment);

        if let SplitState::Split { secondary, .. } = &mut self.state {
            secondary.push_str(fragment);
            return self.regions();
        }

        if let Some(at) = self.find_marker(previous_len) {
            self.state = SplitState::Split {
                primary: self.buffer[..at].trim().to_string(),
                secondary: self.buffer[at..].to_string(),
            };
        }

        self.regions()
    }

    pub fn regions(&self) -> Regions<'_> {
        match &self.state {
            SplitState::Scanning => Regions {
                primary: &self.buffer,
                secondary: "",
            },
            SplitState::Split { primary, secondary } => Regions { primary, secondary },
        }
    }

    pub fn finish(self) -> SplitOutcome {
        match self.state {
            SplitState::Scanning => SplitOutcome {
                primary: self.buffer.clone(),
                full: self.buffer,
                secondary: String::new(),
                marker_found: false,
            },
            SplitState::Split { primary, secondary } => SplitOutcome {
                full: self.buffer,
                primary,
                secondary,
                marker_found: true,
            },
        }
    }

    /// Search only the window a new fragment can affect: an occurrence that
    /// ended inside the old buffer would already have been found.
    fn find_marker(&self, previous_len: usize) -> Option<usize> {
        if self.marker.is_empty() {
            return None;
        }

        let mut start = previous_len.saturating_sub(self.marker.len() - 1);
        while !self.buffer.is_char_boundary(start) {
            start -= 1;
        }

        self.buffer[start..]
            .find(self.marker.as_str())
            .map(|offset| start + offset)
    }
}

/// Drive a fragment stream through `splitter`, calling `on_update` after
/// every non-empty fragment. Upstream errors are returned as-is.
pub async fn consume_stream<S, F>(
    mut fragments: S,
    mut splitter: StreamSplitter,
    mut on_update: F,
) -> Result<SplitOutcome>
where
    S: Stream<Item = Result<String>> + Unpin,
    F: FnMut(Regions<'_>),
{
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        on_update(splitter.push(&fragment));
    }
    Ok(splitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use quill_common::QuillError;

    const MARKER: &str = "Reflection:";

    fn split_all(fragments: &[&str], marker: &str) -> SplitOutcome {
        let mut splitter = StreamSplitter::new(marker);
        for fragment in fragments {
            splitter.push(fragment);
        }
        splitter.finish()
    }

    /// Every way of cutting `text` into two or three pieces on char boundaries.
    fn chunkings(text: &str) -> Vec<Vec<String>> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let mut out = Vec::new();
        for (n, &a) in bounds.iter().enumerate() {
            for &b in &bounds[n..] {
                out.push(vec![
                    text[..a].to_string(),
                    text[a..b].to_string(),
                    text[b..].to_string(),
                ]);
            }
        }
        out
    }

    #[test]
    fn marker_across_fragment_boundary() {
        let outcome = split_all(&["Hello ", "world. Reflec", "tion: it was fine."], MARKER);
        assert_eq!(outcome.primary, "Hello world.");
        assert_eq!(outcome.secondary, "Reflection: it was fine.");
        assert!(outcome.marker_found);
        assert_eq!(outcome.full, "Hello world. Reflection: it was fine.");
    }

    #[test]
    fn no_marker_keeps_everything_primary() {
        let outcome = split_all(&["no marker here"], MARKER);
        assert_eq!(outcome.primary, "no marker here");
        assert_eq!(outcome.secondary, "");
        assert!(!outcome.marker_found);
    }

    #[test]
    fn secondary_stays_empty_while_scanning() {
        let mut splitter = StreamSplitter::new(MARKER);
        for fragment in ["  lead", "ing ", "text  "] {
            let regions = splitter.push(fragment);
            assert_eq!(regions.secondary, "");
        }
        // Untrimmed until a split happens
        assert_eq!(splitter.regions().primary, "  leading text  ");
    }

    #[test]
    fn primary_is_frozen_after_split() {
        let mut splitter = StreamSplitter::new(MARKER);
        splitter.push("Entry text ");
        let frozen = splitter.push("Reflection: a").primary.to_string();
        assert_eq!(frozen, "Entry text");

        for fragment in [" lot", " more ", "text\n", "Entry again"] {
            assert_eq!(splitter.push(fragment).primary, frozen);
        }
        assert_eq!(splitter.regions().secondary, "Reflection: a lot more text\nEntry again");
    }

    #[test]
    fn first_occurrence_wins() {
        let outcome = split_all(
            &["A Reflection: one. ", "Reflection: two."],
            MARKER,
        );
        assert_eq!(outcome.primary, "A");
        assert_eq!(outcome.secondary, "Reflection: one. Reflection: two.");
    }

    #[test]
    fn split_is_independent_of_chunking() {
        let text = "Dear diary, 👱‍♀️ today. Reflection: 👱‍♀️ fine. Reflection: twice";
        let expected = split_all(&[text], MARKER);
        assert_eq!(expected.primary, "Dear diary, 👱‍♀️ today.");

        for chunks in chunkings(text) {
            let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
            assert_eq!(split_all(&refs, MARKER), expected, "chunks: {refs:?}");
        }
    }

    #[test]
    fn emoji_marker_split_mid_character() {
        let marker = "👱‍♀️ **Joy**:";
        let text = "📖 **Journal Entry:** walk\n\n👱‍♀️ **Joy**: lovely";
        let cut = text.find(marker).unwrap() + 4;
        let outcome = split_all(&[&text[..cut], &text[cut..]], marker);
        assert_eq!(outcome.primary, "📖 **Journal Entry:** walk");
        assert_eq!(outcome.secondary, "👱‍♀️ **Joy**: lovely");
    }

    #[test]
    fn single_character_fragments() {
        let text = "xx Reflection: yy";
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let refs: Vec<&str> = chars.iter().map(String::as_str).collect();
        let outcome = split_all(&refs, MARKER);
        assert_eq!(outcome.primary, "xx");
        assert_eq!(outcome.secondary, "Reflection: yy");
    }

    #[test]
    fn unmarked_splitter_never_splits() {
        let mut splitter = StreamSplitter::unmarked();
        splitter.push("anything ");
        splitter.push("Reflection: at all");
        assert!(!splitter.is_split());
        assert_eq!(splitter.regions().primary, "anything Reflection: at all");
    }

    #[tokio::test]
    async fn consume_stream_reports_every_fragment() {
        let fragments = stream::iter(vec![
            Ok("Hello ".to_string()),
            Ok(String::new()),
            Ok("world. Reflec".to_string()),
            Ok("tion: it was fine.".to_string()),
        ]);

        let mut updates = Vec::new();
        let outcome = consume_stream(fragments, StreamSplitter::new(MARKER), |regions| {
            updates.push(regions.to_snapshot());
        })
        .await
        .unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].primary, "Hello ");
        assert_eq!(updates[1].primary, "Hello world. Reflec");
        assert_eq!(updates[1].secondary, "");
        assert_eq!(updates[2].primary, "Hello world.");
        assert_eq!(updates[2].secondary, "Reflection: it was fine.");
        assert_eq!(outcome.secondary, "Reflection: it was fine.");
    }

    #[tokio::test]
    async fn consume_stream_propagates_upstream_error() {
        let fragments = stream::iter(vec![
            Ok("partial".to_string()),
            Err(QuillError::Llm("connection reset".into())),
            Ok("never seen".to_string()),
        ]);

        let mut seen = 0;
        let result = consume_stream(fragments, StreamSplitter::new(MARKER), |_| seen += 1).await;

        assert!(matches!(result, Err(QuillError::Llm(_))));
        assert_eq!(seen, 1);
    }
}
