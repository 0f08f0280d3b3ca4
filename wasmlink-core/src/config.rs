//! Loader configuration.
//!
//! All toggles are independent. During a load they are applied in a fixed order:
//! 1. `strict_imports` while the import table is synthesized,
//! 2. `zero_memory` right after instantiation (heap region only, data segments survive),
//! 3. `skip_init` in place of the ABI bring-up steps.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Unmatched function imports fail the load instead of becoming zero-stubs.
    pub strict_imports: bool,
    /// The embedder runs the module's initializers itself.
    pub skip_init: bool,
    /// Zero the heap region of linear memory after instantiation.
    pub zero_memory: bool,
}

impl LoaderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_strict_imports(mut self, strict: bool) -> Self {
        self.strict_imports = strict;
        self
    }

    pub fn with_skip_init(mut self, skip: bool) -> Self {
        self.skip_init = skip;
        self
    }

    pub fn with_zero_memory(mut self, zero: bool) -> Self {
        self.zero_memory = zero;
        self
    }
}
