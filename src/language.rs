//! Language profile table
//!
//! Static mapping from a language identifier to the file extension, Docker
//! image, and run command used to execute it. The three facets live in one
//! composite record resolved through the `Language` enum, so a language
//! cannot end up with an extension but no image (or vice versa).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Nodejs,
    Golang,
    Cpp,
}

/// Everything needed to run one language: staged file extension, container
/// image, and the command prefixed to the staged file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// File extension for the staged code file, including the dot
    pub extension: &'static str,
    /// Docker image reference
    pub image: &'static str,
    /// Run command; the staged file name is appended
    pub run_command: &'static str,
}

const PYTHON: LanguageProfile = LanguageProfile {
    extension: ".py",
    image: "python:3.9-slim",
    run_command: "python",
};

const NODEJS: LanguageProfile = LanguageProfile {
    extension: ".js",
    image: "node:16-slim",
    run_command: "node",
};

const GOLANG: LanguageProfile = LanguageProfile {
    extension: ".go",
    image: "golang:1.18-alpine",
    run_command: "go run",
};

const CPP: LanguageProfile = LanguageProfile {
    extension: ".cpp",
    image: "gcc:latest",
    run_command: "g++ -o code.out code.cpp && ./code.out",
};

impl Language {
    /// All supported languages
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::Nodejs,
            Language::Golang,
            Language::Cpp,
        ]
    }

    /// The composite profile for this language
    pub fn profile(&self) -> &'static LanguageProfile {
        match self {
            Language::Python => &PYTHON,
            Language::Nodejs => &NODEJS,
            Language::Golang => &GOLANG,
            Language::Cpp => &CPP,
        }
    }

    /// Name of the staged code file, e.g. `code.py`
    pub fn file_name(&self) -> String {
        format!("code{}", self.profile().extension)
    }

    /// Shell line run inside the container working directory
    pub fn entry_command(&self) -> String {
        format!("{} {}", self.profile().run_command, self.file_name())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "nodejs" | "node" | "javascript" | "js" => Ok(Language::Nodejs),
            "golang" | "go" => Ok(Language::Golang),
            "cpp" | "c++" => Ok(Language::Cpp),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Nodejs => write!(f, "nodejs"),
            Language::Golang => write!(f, "golang"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}
