//! Schema file output.
//!
//! Writes one schema file per registered endpoint under `request/` and one
//! per declared response under `response/`.

use crate::error::DispatchError;
use crate::registry::EndpointRegistry;
use courier_wire::StructuredCodec;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which side of an exchange a schema describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Endpoint payload
    Request,
    /// Declared response
    Response,
}

impl SchemaKind {
    fn dir_name(self) -> &'static str {
        match self {
            SchemaKind::Request => "request",
            SchemaKind::Response => "response",
        }
    }
}

/// Schema output options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// File extension without the dot
    pub extension: String,
    /// Drop `package` lines entirely
    pub remove_package: bool,
    /// Package to use instead of the one derived from the module path
    pub package: Option<String>,
    /// Append `.request` or `.response` to the package
    pub suffix_kind: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            extension: "cddl".to_string(),
            remove_package: false,
            package: None,
            suffix_kind: false,
        }
    }
}

impl SchemaOptions {
    /// Apply the options to rendered schema text
    pub fn apply(&self, text: &str, kind: SchemaKind) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            match line.trim_start().strip_prefix("package ") {
                Some(_) if self.remove_package => continue,
                Some(original) => {
                    let base = self
                        .package
                        .as_deref()
                        .unwrap_or_else(|| original.trim_end().trim_end_matches(';'));
                    if self.suffix_kind {
                        out.push_str(&format!("package {}.{};", base, kind.dir_name()));
                    } else {
                        out.push_str(&format!("package {};", base));
                    }
                }
                None => out.push_str(line),
            }
            out.push('\n');
        }

        if self.remove_package {
            out.trim_start_matches('\n').to_string()
        } else {
            out
        }
    }
}

/// Write schema files for every endpoint and response in `registry`.
///
/// Returns the paths written.
pub fn dump_schemas<C: StructuredCodec>(
    registry: &EndpointRegistry<C>,
    codec: &C,
    dir: &Path,
    options: &SchemaOptions,
) -> Result<Vec<PathBuf>, DispatchError> {
    let request_dir = dir.join(SchemaKind::Request.dir_name());
    let response_dir = dir.join(SchemaKind::Response.dir_name());
    fs::create_dir_all(&request_dir)?;
    fs::create_dir_all(&response_dir)?;

    let mut written = Vec::new();
    for info in registry.endpoints() {
        let path = request_dir.join(format!("{}.{}", info.endpoint(), options.extension));
        fs::write(&path, options.apply(info.schema_text(codec), SchemaKind::Request))?;
        written.push(path);
    }
    for response in registry.responses() {
        let path = response_dir.join(format!("{}.{}", response.endpoint(), options.extension));
        fs::write(&path, options.apply(&response.schema_text(codec), SchemaKind::Response))?;
        written.push(path);
    }

    info!("Wrote {} schema files to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::{Consumer, PacketHandler};
    use crate::packet::Packet;
    use courier_wire::{CborCodec, EnvelopeModel};
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize)]
    struct Lookup {
        key: String,
    }

    impl EnvelopeModel for Lookup {
        fn cddl() -> String {
            "{ key: tstr }".to_string()
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Found {
        value: Vec<u8>,
    }

    impl EnvelopeModel for Found {
        fn endpoint() -> Option<&'static str> {
            Some("Found")
        }

        fn cddl() -> String {
            "{ value: bstr }".to_string()
        }
    }

    #[derive(Default)]
    struct LookupHandler;

    impl PacketHandler for LookupHandler {
        fn handle_packet(
            &mut self,
            _consumer: &dyn Consumer,
            _packet: Packet,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_options() {
        let text = "package a.b;\n\nRule = any\n";

        assert_eq!(SchemaOptions::default().apply(text, SchemaKind::Request), text);

        let removed = SchemaOptions {
            remove_package: true,
            ..Default::default()
        };
        assert_eq!(removed.apply(text, SchemaKind::Request), "Rule = any\n");

        let suffixed = SchemaOptions {
            package: Some("com.acme".to_string()),
            suffix_kind: true,
            ..Default::default()
        };
        assert!(suffixed
            .apply(text, SchemaKind::Response)
            .starts_with("package com.acme.response;"));

        let kept = SchemaOptions {
            suffix_kind: true,
            ..Default::default()
        };
        assert!(kept
            .apply(text, SchemaKind::Request)
            .starts_with("package a.b.request;"));
    }

    #[test]
    fn test_dump_schemas() {
        let dir = TempDir::new().unwrap();
        let codec = CborCodec::new();
        let registry: EndpointRegistry = EndpointRegistry::builder()
            .register::<Lookup, LookupHandler>("Lookup")
            .response::<Found>()
            .build()
            .unwrap();

        let options = SchemaOptions {
            extension: "txt".to_string(),
            ..Default::default()
        };
        let written = dump_schemas(&registry, &codec, dir.path(), &options).unwrap();
        assert_eq!(written.len(), 2);

        let request = fs::read_to_string(dir.path().join("request/Lookup.txt")).unwrap();
        assert!(request.contains("Lookup = { key: tstr }"));
        let response = fs::read_to_string(dir.path().join("response/Found.txt")).unwrap();
        assert!(response.contains("Found = { value: bstr }"));
        assert!(response.starts_with("package courier_dispatch.schema.tests;"));
    }
}
