//! Static file-type table.
//!
//! Maps a path to a [`FileKind`] and an optional language name. Extensions
//! are matched case-insensitively; a handful of well-known extensionless
//! file names (`Dockerfile`, `Makefile`, `README`, ...) are matched by name.
//!
//! | Kind | Examples |
//! |------|----------|
//! | code | `.rs`, `.py`, `.ts`, `.go`, `Dockerfile` |
//! | markup | `.html`, `.xml`, `.css`, `.vue` |
//! | data | `.json`, `.yaml`, `.toml`, `.csv` |
//! | documentation | `.md`, `.rst`, `.txt`, `README` |
//! | other | everything else |

use crate::models::{file_name, FileKind};

/// Classification of a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    pub kind: FileKind,
    pub language: Option<&'static str>,
}

impl FileType {
    const fn new(kind: FileKind, language: &'static str) -> Self {
        Self {
            kind,
            language: Some(language),
        }
    }

    const fn other() -> Self {
        Self {
            kind: FileKind::Other,
            language: None,
        }
    }
}

/// Classify a repository path by its file name and extension.
pub fn classify_path(path: &str) -> FileType {
    let name = file_name(path);

    if let Some(ft) = by_file_name(name) {
        return ft;
    }

    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return FileType::other(),
    };

    by_extension(&ext).unwrap_or_else(FileType::other)
}

fn by_file_name(name: &str) -> Option<FileType> {
    use FileKind::*;
    let ft = match name {
        "Dockerfile" => FileType::new(Code, "Dockerfile"),
        "Makefile" | "GNUmakefile" => FileType::new(Code, "Makefile"),
        "Jenkinsfile" => FileType::new(Code, "Groovy"),
        "README" | "CHANGELOG" | "CONTRIBUTING" => FileType::new(Documentation, "Text"),
        "LICENSE" | "COPYING" => FileType::new(Documentation, "Text"),
        _ => return None,
    };
    Some(ft)
}

fn by_extension(ext: &str) -> Option<FileType> {
    use FileKind::*;
    let ft = match ext {
        // code
        "rs" => FileType::new(Code, "Rust"),
        "py" | "pyi" => FileType::new(Code, "Python"),
        "js" | "mjs" | "cjs" => FileType::new(Code, "JavaScript"),
        "jsx" => FileType::new(Code, "JavaScript"),
        "ts" | "mts" | "cts" => FileType::new(Code, "TypeScript"),
        "tsx" => FileType::new(Code, "TypeScript"),
        "go" => FileType::new(Code, "Go"),
        "java" => FileType::new(Code, "Java"),
        "kt" | "kts" => FileType::new(Code, "Kotlin"),
        "scala" => FileType::new(Code, "Scala"),
        "c" | "h" => FileType::new(Code, "C"),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => FileType::new(Code, "C++"),
        "cs" => FileType::new(Code, "C#"),
        "rb" => FileType::new(Code, "Ruby"),
        "php" => FileType::new(Code, "PHP"),
        "swift" => FileType::new(Code, "Swift"),
        "dart" => FileType::new(Code, "Dart"),
        "lua" => FileType::new(Code, "Lua"),
        "sh" | "bash" | "zsh" => FileType::new(Code, "Shell"),
        "sql" => FileType::new(Code, "SQL"),
        "ex" | "exs" => FileType::new(Code, "Elixir"),
        "hs" => FileType::new(Code, "Haskell"),
        // markup
        "html" | "htm" => FileType::new(Markup, "HTML"),
        "xml" => FileType::new(Markup, "XML"),
        "svg" => FileType::new(Markup, "SVG"),
        "css" => FileType::new(Markup, "CSS"),
        "scss" | "sass" => FileType::new(Markup, "SCSS"),
        "vue" => FileType::new(Markup, "Vue"),
        "svelte" => FileType::new(Markup, "Svelte"),
        // data
        "json" => FileType::new(Data, "JSON"),
        "yaml" | "yml" => FileType::new(Data, "YAML"),
        "toml" => FileType::new(Data, "TOML"),
        "csv" => FileType::new(Data, "CSV"),
        "ini" | "cfg" => FileType::new(Data, "INI"),
        "graphql" | "gql" => FileType::new(Data, "GraphQL"),
        "proto" => FileType::new(Data, "Protocol Buffers"),
        // documentation
        "md" | "markdown" => FileType::new(Documentation, "Markdown"),
        "mdx" => FileType::new(Documentation, "MDX"),
        "rst" => FileType::new(Documentation, "reStructuredText"),
        "adoc" => FileType::new(Documentation, "AsciiDoc"),
        "txt" => FileType::new(Documentation, "Text"),
        _ => return None,
    };
    Some(ft)
}
