pub mod cpp;
pub mod go;
pub mod java;
pub mod python;

use crate::analyzer::ports::LanguagePlugin;
use crate::domain::Language;

/// Returns the extraction rules for `language`. C and C++ share the same grammar and
/// call/extraction conventions, matching the single `Cpp_*` extractor family used for
/// both in the source material this engine's bug families were distilled from.
pub fn plugin_for(language: Language) -> Box<dyn LanguagePlugin> {
    match language {
        Language::C | Language::Cpp => Box::new(cpp::CppPlugin),
        Language::Java => Box::new(java::JavaPlugin),
        Language::Python => Box::new(python::PythonPlugin),
        Language::Go => Box::new(go::GoPlugin),
    }
}
