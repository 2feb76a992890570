//! Minimal CLI: graph documents → (C# generator | type summary)
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use graph_literal::{CodeGenerator, GeneratorOptions, GraphDocument, VisitedScope};
use tracing::{Level, debug, info};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// emit C# object-construction code from JSON graph documents
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// more logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// load documents and print a `Generate()` method yielding every root
    Emit(EmitOut),
    /// load documents and print their registered types as JSON
    Describe(DescribeOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to the graph document inside each file (e.g. /fixtures/0)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct EmitOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .cs file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// share the visited set across roots or reset it per root
    #[arg(long, value_enum, default_value_t = VisitedScope::Shared)]
    visited_scope: VisitedScope,

    /// write string values without escaping
    #[arg(long)]
    raw_strings: bool,

    /// write enum values as `Type.Variant`
    #[arg(long)]
    qualify_enums: bool,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<GraphDocument>> {
        let source_paths = expand_inputs(&self.input)?;
        let mut documents = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let mut json_value = serde_json::from_str::<serde_json::Value>(&source)
                .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
            if let Some(pointer) = self.json_pointer.as_ref() {
                json_value = match json_value.pointer_mut(pointer) {
                    Some(selected) => selected.take(),
                    None => bail!("JSON pointer {pointer} selects nothing in {source_path_str}"),
                };
            }
            let document = GraphDocument::from_value(json_value)
                .with_context(|| format!("invalid graph document ({source_path_str})"))?;
            info!(path = %source_path_str, roots = document.root_ids().len(), "loaded");
            documents.push(document);
        }
        Ok(documents)
    }
}

impl EmitOut {
    fn options(&self) -> GeneratorOptions {
        GeneratorOptions {
            visited_scope: self.visited_scope,
            escape_strings: !self.raw_strings,
            qualify_enums: self.qualify_enums,
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Emit(target) => {
                let documents = target.input_settings.load_documents()?;
                // roots of every document, in input order, in one method
                let generator = CodeGenerator::new(documents.iter().flat_map(|d| d.roots()))
                    .with_options(target.options());
                let code = generator.generate().context("code generation failed")?;
                write_output(target.out.as_ref(), &code)
            }
            Command::Describe(target) => {
                let documents = target.input_settings.load_documents()?;
                let mut summaries: Vec<serde_json::Value> =
                    documents.iter().map(|d| d.registry().describe()).collect();
                let summary = match summaries.len() {
                    1 => summaries.remove(0),
                    _ => serde_json::Value::Array(summaries),
                };
                let summary_src = serde_json::to_string_pretty(&summary)?;
                write_output(target.out.as_ref(), &summary_src)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: Option<&PathBuf>, contents: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}

/// Literal paths pass through untouched (a missing file fails later, when it
/// is read); a glob must match at least one document.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(inputs.len());
    for input in inputs {
        if !input.contains(['*', '?', '[', '{']) {
            paths.push(PathBuf::from(input));
            continue;
        }
        let before = paths.len();
        let matches = glob::glob(input).with_context(|| format!("`{input}` is not a valid glob"))?;
        for entry in matches {
            paths.push(entry.with_context(|| format!("cannot read a match of `{input}`"))?);
        }
        if paths.len() == before {
            bail!("no graph documents match `{input}`");
        }
        debug!(glob = %input, documents = paths.len() - before, "expanded");
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_flags_map_onto_options() {
        let cli = CommandLineInterface::try_parse_from([
            "graph-literal",
            "-vv",
            "emit",
            "-i",
            "a.json",
            "b.json",
            "--visited-scope",
            "per-root",
            "--raw-strings",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), Level::DEBUG);
        let Command::Emit(emit) = &cli.cmd else { panic!("expected emit") };
        assert_eq!(emit.input_settings.input, ["a.json", "b.json"]);
        let options = emit.options();
        assert_eq!(options.visited_scope, VisitedScope::PerRoot);
        assert!(!options.escape_strings);
        assert!(!options.qualify_enums);
    }

    #[test]
    fn input_is_required() {
        assert!(CommandLineInterface::try_parse_from(["graph-literal", "describe"]).is_err());
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = expand_inputs(&["does/not/exist.json".to_string()]).unwrap();
        assert_eq!(paths, [PathBuf::from("does/not/exist.json")]);
    }

    #[test]
    fn empty_glob_is_an_error() {
        let err = expand_inputs(&["/definitely/missing/*.json".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "no graph documents match `/definitely/missing/*.json`");
    }
}
