//! Shader module composition and caching.
//!
//! WGSL has no include mechanism, so modules are assembled from ordered source
//! fragments (generated constant preludes, shared function libraries, entry
//! points) before compilation.

use log::{debug, info};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader library lookups.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },
}

/// Concatenate WGSL fragments in order, one newline between each.
pub fn compose_source(parts: &[&str]) -> String {
    let mut source = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for part in parts {
        source.push_str(part);
        if !part.ends_with('\n') {
            source.push('\n');
        }
    }
    source
}

/// Central registry for compiled shader modules.
#[derive(Default)]
pub struct ShaderLibrary {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
}

impl ShaderLibrary {
    /// Create a new empty shader library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a shader from a WGSL source string and register it under `name`.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Arc<wgpu::ShaderModule> {
        debug!("Loading shader '{}' from source ({} bytes)", name, source.len());

        let module = Arc::new(device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        }));

        let replaced = self
            .modules
            .insert(name.to_string(), module.clone())
            .is_some();
        if replaced {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }
        module
    }

    /// Compose `parts` and compile the result under `name`.
    pub fn load_composed(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        parts: &[&str],
    ) -> Arc<wgpu::ShaderModule> {
        self.load_from_source(device, name, &compose_source(parts))
    }

    /// Get a previously loaded shader by name.
    pub fn get(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ShaderError::NotLoaded {
                name: name.to_string(),
            })
    }

    /// Number of loaded shaders.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_inserts_separators() {
        let source = compose_source(&["const A: u32 = 1u;", "const B: u32 = 2u;\n", "fn f() {}"]);
        assert_eq!(source, "const A: u32 = 1u;\nconst B: u32 = 2u;\nfn f() {}\n");
    }

    #[test]
    fn test_compose_empty() {
        assert_eq!(compose_source(&[]), "");
    }

    #[test]
    fn test_library_starts_empty() {
        let library = ShaderLibrary::new();
        assert!(library.is_empty());
        assert!(matches!(
            library.get("missing"),
            Err(ShaderError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_load_and_replace() {
        let Ok(ctx) = crate::init_headless_blocking(&crate::GpuOptions::default()) else {
            return;
        };
        let mut library = ShaderLibrary::new();
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        library.load_from_source(&ctx.device, "solid", src);
        library.load_composed(&ctx.device, "solid", &[src]);
        assert_eq!(library.len(), 1);
        assert!(library.get("solid").is_ok());
    }
}
