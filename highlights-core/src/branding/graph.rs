//! Typed ffmpeg filter graphs.
//!
//! Graphs are assembled from [`FilterChain`]s of [`Filter`]s joined by
//! [`StreamLabel`]s and rendered to `-filter_complex` syntax by
//! [`FilterGraph::render`], the only place that knows the textual format.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::ToolCommand;

const SPECIAL: [char; 6] = [',', ':', ';', '\'', '[', ']'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// A pad label such as `[0:v]` or `[tmp1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLabel(String);

impl StreamLabel {
    pub fn input(index: usize, kind: StreamKind) -> Self {
        Self(format!("{index}:{}", kind.as_str()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Form accepted by `-map`.
    pub fn as_map(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterOption {
    Positional(String),
    Named(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    name: String,
    options: Vec<FilterOption>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.options.push(FilterOption::Positional(value.to_string()));
        self
    }

    pub fn opt(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options
            .push(FilterOption::Named(key.into(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a named option, unquoted.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.iter().find_map(|option| match option {
            FilterOption::Named(name, value) if name == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn positional(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter_map(|option| match option {
                FilterOption::Positional(value) => Some(value.as_str()),
                FilterOption::Named(..) => None,
            })
            .collect()
    }

    fn render(&self) -> String {
        if self.options.is_empty() {
            return self.name.clone();
        }
        let options: Vec<String> = self
            .options
            .iter()
            .map(|option| match option {
                FilterOption::Positional(value) => quote_value(value),
                FilterOption::Named(key, value) => format!("{key}={}", quote_value(value)),
            })
            .collect();
        format!("{}={}", self.name, options.join(":"))
    }
}

fn quote_value(value: &str) -> String {
    if value.contains(&SPECIAL[..]) {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterChain {
    pub inputs: Vec<StreamLabel>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<StreamLabel>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: StreamLabel) -> Self {
        self.inputs.push(label);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: StreamLabel) -> Self {
        self.outputs.push(label);
        self
    }

    fn render(&self) -> String {
        let mut rendered = String::new();
        for label in &self.inputs {
            rendered.push_str(&label.to_string());
        }
        let filters: Vec<String> = self.filters.iter().map(Filter::render).collect();
        rendered.push_str(&filters.join(","));
        for label in &self.outputs {
            rendered.push_str(&label.to_string());
        }
        rendered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.chains.iter().flat_map(|chain| chain.filters.iter())
    }

    pub fn find(&self, name: &str) -> Option<&Filter> {
        self.filters().find(|filter| filter.name() == name)
    }

    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(FilterChain::render)
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInput {
    pub options: Vec<String>,
    pub path: PathBuf,
}

impl MediaInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            options: Vec::new(),
            path: path.into(),
        }
    }

    /// An ffconcat list read through the concat demuxer.
    pub fn concat_list(path: impl Into<PathBuf>) -> Self {
        Self {
            options: ["-f", "concat", "-safe", "0"]
                .into_iter()
                .map(String::from)
                .collect(),
            path: path.into(),
        }
    }
}

/// Full ffmpeg argument vector for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegInvocation {
    pub inputs: Vec<MediaInput>,
    pub graph: Option<FilterGraph>,
    pub maps: Vec<String>,
    pub codec_args: Vec<String>,
    pub output: PathBuf,
}

impl FfmpegInvocation {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            graph: None,
            maps: Vec::new(),
            codec_args: Vec::new(),
            output: output.into(),
        }
    }

    pub fn input(mut self, input: MediaInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn graph(mut self, graph: FilterGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn map(mut self, target: impl Into<String>) -> Self {
        self.maps.push(target.into());
        self
    }

    pub fn codec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codec_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();
        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".into());
            args.push(path_arg(&input.path));
        }
        if let Some(graph) = &self.graph {
            args.push("-filter_complex".into());
            args.push(graph.render());
        }
        for map in &self.maps {
            args.push("-map".into());
            args.push(map.clone());
        }
        args.extend(self.codec_args.iter().cloned());
        args.push(path_arg(&self.output));
        args
    }

    pub fn to_command(&self, binary: &str, timeout: Duration) -> ToolCommand {
        ToolCommand::new(binary)
            .args(self.args())
            .with_timeout(timeout)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
