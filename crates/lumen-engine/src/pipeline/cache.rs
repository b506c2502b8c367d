use std::collections::HashMap;

use lumen_shader::to_define_line;

use super::program::{ProgramHandle, ShaderSource};

/// `vertex + "+" + fragment + "@" + define lines joined by '\n'`.
pub fn program_key(vertex: &ShaderSource, fragment: &ShaderSource, defines: &[String]) -> String {
    let lines: Vec<String> = defines.iter().filter_map(|d| to_define_line(d)).collect();
    format!("{}+{}@{}", vertex.identity(), fragment.identity(), lines.join("\n"))
}

/// At most one program per key.
#[derive(Debug, Default)]
pub(crate) struct ProgramCache {
    by_key: HashMap<String, ProgramHandle>,
}

impl ProgramCache {
    pub fn get(&self, key: &str) -> Option<ProgramHandle> {
        self.by_key.get(key).copied()
    }

    pub fn insert(&mut self, key: String, handle: ProgramHandle) {
        self.by_key.insert(key, handle);
    }

    pub fn remove(&mut self, key: &str) -> Option<ProgramHandle> {
        self.by_key.remove(key)
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let defines = vec!["FOG".to_string(), "NUM_LIGHTS 4".to_string()];
        let key = program_key(&ShaderSource::named("std"), &ShaderSource::named("std"), &defines);
        assert_eq!(key, "std+std@#define FOG\n#define NUM_LIGHTS 4");
    }

    #[test]
    fn define_order_matters() {
        let a = program_key(&ShaderSource::named("s"), &ShaderSource::named("s"), &["A".into(), "B".into()]);
        let b = program_key(&ShaderSource::named("s"), &ShaderSource::named("s"), &["B".into(), "A".into()]);
        assert_ne!(a, b);
    }
}
