//! Typed filter-graph statements, validated before serialization.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{VireoError, VireoResult};

/// One registered input file with its per-input flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSpec {
    /// Path handed to `-i`.
    pub path: PathBuf,
    /// Whether the input is looped forever (`-stream_loop -1`), used for
    /// effect and presenter overlays that must cover the whole render.
    pub loop_forever: bool,
}

/// Which stream of a raw input a pad refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamSelector {
    /// The input's video stream (`[N:v]`).
    Video,
    /// The input's audio stream (`[N:a]`).
    Audio,
}

impl StreamSelector {
    fn suffix(self) -> char {
        match self {
            Self::Video => 'v',
            Self::Audio => 'a',
        }
    }
}

/// A source pad for a filter statement: either a raw input stream or a
/// label produced by an earlier statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pad {
    /// Stream of a registered input, by index.
    Input {
        /// Index into the builder's input list.
        index: usize,
        /// Video or audio stream of that input.
        stream: StreamSelector,
    },
    /// Labeled output of an earlier statement.
    Label(String),
}

impl Pad {
    /// Video stream of input `index`.
    pub fn video(index: usize) -> Self {
        Self::Input {
            index,
            stream: StreamSelector::Video,
        }
    }

    /// Audio stream of input `index`.
    pub fn audio(index: usize) -> Self {
        Self::Input {
            index,
            stream: StreamSelector::Audio,
        }
    }

    /// Labeled pad.
    pub fn label(name: impl Into<String>) -> Self {
        Self::Label(name.into())
    }

    fn wire(&self) -> String {
        match self {
            Self::Input { index, stream } => format!("[{index}:{}]", stream.suffix()),
            Self::Label(name) => format!("[{name}]"),
        }
    }
}

#[derive(Clone, Debug)]
struct Statement {
    sources: Vec<Pad>,
    body: String,
    destinations: Vec<String>,
}

/// Builds a filter graph as a sequence of typed statements.
///
/// Statements are validated as they are appended: every source pad must be a
/// registered input stream or a label some earlier statement produced,
/// labels are consumed at most once (ffmpeg rejects fan-out without an
/// explicit `split`), and every destination label is unique. Serialization
/// to the `-filter_complex` wire syntax therefore cannot produce a graph the
/// encoder will reject for wiring reasons.
#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    inputs: Vec<InputSpec>,
    statements: Vec<Statement>,
    produced: HashSet<String>,
    consumed: HashSet<String>,
}

impl GraphBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input file and return its index.
    ///
    /// Indices are assigned in registration order; filter expressions must
    /// reference these indices and never assume a fixed layout, because
    /// optional inputs shift everything after them.
    pub fn add_input(&mut self, path: impl Into<PathBuf>, loop_forever: bool) -> usize {
        self.inputs.push(InputSpec {
            path: path.into(),
            loop_forever,
        });
        self.inputs.len() - 1
    }

    /// Registered inputs in declaration order.
    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// Append one statement: `sources` → `body` → `destinations`.
    pub fn statement(
        &mut self,
        sources: &[Pad],
        body: impl Into<String>,
        destinations: &[&str],
    ) -> VireoResult<()> {
        for pad in sources {
            match pad {
                Pad::Input { index, .. } => {
                    if *index >= self.inputs.len() {
                        return Err(VireoError::graph(format!(
                            "statement references input {index}, but only {} inputs are registered",
                            self.inputs.len()
                        )));
                    }
                }
                Pad::Label(name) => {
                    if !self.produced.contains(name) {
                        return Err(VireoError::graph(format!(
                            "statement consumes pad '{name}' which no earlier statement produced"
                        )));
                    }
                    if !self.consumed.insert(name.clone()) {
                        return Err(VireoError::graph(format!(
                            "pad '{name}' is consumed twice; split it explicitly instead"
                        )));
                    }
                }
            }
        }

        for dest in destinations {
            if dest.is_empty() {
                return Err(VireoError::graph("destination label must be non-empty"));
            }
            if !self.produced.insert((*dest).to_owned()) {
                return Err(VireoError::graph(format!(
                    "destination label '{dest}' is not unique within the graph"
                )));
            }
        }

        self.statements.push(Statement {
            sources: sources.to_vec(),
            body: body.into(),
            destinations: destinations.iter().map(|d| (*d).to_owned()).collect(),
        });
        Ok(())
    }

    /// Whether any statement has been appended.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Whether `label` was produced and not yet consumed.
    pub fn is_open(&self, label: &str) -> bool {
        self.produced.contains(label) && !self.consumed.contains(label)
    }

    /// Serialize to the `-filter_complex` wire syntax.
    pub fn serialize(&self) -> String {
        self.statements
            .iter()
            .map(|stmt| {
                let mut out = String::new();
                for pad in &stmt.sources {
                    out.push_str(&pad.wire());
                }
                out.push_str(&stmt.body);
                for dest in &stmt.destinations {
                    out.push_str(&format!("[{dest}]"));
                }
                out
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_statements_in_order() {
        let mut g = GraphBuilder::new();
        let base = g.add_input("base.mp4", false);
        g.statement(&[Pad::video(base)], "scale=1280:720,setsar=1", &["v_scaled"])
            .unwrap();
        g.statement(
            &[Pad::label("v_scaled")],
            "format=yuv420p",
            &["vout"],
        )
        .unwrap();

        assert_eq!(
            g.serialize(),
            "[0:v]scale=1280:720,setsar=1[v_scaled];[v_scaled]format=yuv420p[vout]"
        );
    }

    #[test]
    fn rejects_unknown_input_index() {
        let mut g = GraphBuilder::new();
        let err = g
            .statement(&[Pad::video(0)], "scale=2:2", &["v"])
            .unwrap_err();
        assert!(err.to_string().contains("input 0"));
    }

    #[test]
    fn rejects_undeclared_source_pad() {
        let mut g = GraphBuilder::new();
        g.add_input("base.mp4", false);
        let err = g
            .statement(&[Pad::label("ghost")], "format=rgba", &["v"])
            .unwrap_err();
        assert!(err.to_string().contains("'ghost'"));
    }

    #[test]
    fn rejects_duplicate_destination_label() {
        let mut g = GraphBuilder::new();
        let base = g.add_input("base.mp4", false);
        g.statement(&[Pad::video(base)], "scale=2:2", &["v"]).unwrap();
        let err = g
            .statement(&[Pad::label("v")], "format=rgba", &["v"])
            .unwrap_err();
        assert!(err.to_string().contains("not unique"));
    }

    #[test]
    fn rejects_double_consumption_without_split() {
        let mut g = GraphBuilder::new();
        let base = g.add_input("base.mp4", false);
        g.statement(&[Pad::video(base)], "scale=2:2", &["v"]).unwrap();
        g.statement(&[Pad::label("v")], "format=rgba", &["a"]).unwrap();
        let err = g
            .statement(&[Pad::label("v")], "format=rgba", &["b"])
            .unwrap_err();
        assert!(err.to_string().contains("consumed twice"));
    }

    #[test]
    fn split_destinations_are_both_usable() {
        let mut g = GraphBuilder::new();
        let narr = g.add_input("voice.wav", false);
        g.statement(
            &[Pad::audio(narr)],
            "asplit=2",
            &["narr_main", "narr_side"],
        )
        .unwrap();
        assert!(g.is_open("narr_main"));
        assert!(g.is_open("narr_side"));
        assert_eq!(g.serialize(), "[0:a]asplit=2[narr_main][narr_side]");
    }
}
