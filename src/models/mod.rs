//! In-process demo slaves and the registry-backed component loader.
//!
//! The loader resolves a wiring document's `fmuPath` three ways: a plain
//! model name looks up a registered in-process model with its embedded
//! description; an `.xml` path reads a description document directly; an
//! `.fmu`/`.zip` path reads `modelDescription.xml` out of the bundle. In the
//! latter two cases the slave behavior is still found in the registry, keyed
//! by the description's `modelIdentifier`.

mod values;
mod water_tank;

pub use values::Values;
pub use water_tank::{WaterTankCtr, WaterTankEnv};

use crate::parser::{ContentSource, FsSource, ZipSource, parse_model_description};
use crate::slave::{ComponentLoader, LoadError, LoadedComponent, SlaveModule};
use crate::validator::validate_model_description;
use camino::Utf8Path;
use indexmap::IndexMap;
use std::fs::File;
use std::io::BufReader;

/// A registered in-process model: its embedded component description plus
/// a constructor for the module.
pub struct BuiltinModel {
    pub description_xml: &'static str,
    pub module: fn() -> Box<dyn SlaveModule>,
}

/// Loads components from a registry of in-process models.
pub struct BuiltinLoader {
    registry: IndexMap<String, BuiltinModel>,
}

impl BuiltinLoader {
    pub fn new() -> Self {
        BuiltinLoader {
            registry: IndexMap::new(),
        }
    }

    /// A loader with the shipped demo models registered.
    pub fn with_demo_models() -> Self {
        let mut loader = Self::new();
        loader.register("waterTankEnv", water_tank::ENV_DESCRIPTION_XML, || {
            Box::new(WaterTankEnv)
        });
        loader.register("waterTankCtr", water_tank::CTR_DESCRIPTION_XML, || {
            Box::new(WaterTankCtr)
        });
        loader.register("values", values::DESCRIPTION_XML, || Box::new(Values));
        loader
    }

    pub fn register(
        &mut self,
        name: &str,
        description_xml: &'static str,
        module: fn() -> Box<dyn SlaveModule>,
    ) {
        self.registry.insert(
            name.to_string(),
            BuiltinModel {
                description_xml,
                module,
            },
        );
    }
}

impl Default for BuiltinLoader {
    fn default() -> Self {
        Self::with_demo_models()
    }
}

impl ComponentLoader for BuiltinLoader {
    fn load(&self, path: &Utf8Path) -> Result<LoadedComponent, LoadError> {
        let bundle_err = |source: anyhow::Error| LoadError::Bundle {
            path: path.to_string(),
            source,
        };

        // external description text, if the path points at one
        let xml: Option<String> = match path.extension().unwrap_or_default() {
            "fmu" | "zip" => {
                let file = File::open(path.as_str()).map_err(|e| bundle_err(e.into()))?;
                let mut src = ZipSource::new(BufReader::new(file)).map_err(bundle_err)?;
                Some(
                    src.read_to_string(Utf8Path::new("modelDescription.xml"))
                        .map_err(bundle_err)?,
                )
            }
            "xml" => Some(FsSource.read_to_string(path).map_err(bundle_err)?),
            _ => None,
        };

        let (description, registered) = match xml {
            Some(xml) => {
                let md = parse_model_description(&xml)?;
                validate_model_description(&md)?;
                (md, None)
            }
            None => {
                let stem = path.file_stem().unwrap_or(path.as_str());
                let model = self
                    .registry
                    .get(stem)
                    .ok_or_else(|| LoadError::UnknownModel(stem.to_string()))?;
                let md = parse_model_description(model.description_xml)?;
                validate_model_description(&md)?;
                (md, Some(model))
            }
        };

        // behavior is keyed by the model identifier when the description
        // came from outside the registry
        let model = match registered {
            Some(m) => m,
            None => {
                let id = description.model_identifier();
                self.registry
                    .get(id)
                    .ok_or_else(|| LoadError::UnknownModel(id.to_string()))?
            }
        };

        Ok(LoadedComponent {
            description,
            module: (model.module)(),
        })
    }
}
