use log::{debug, info};
use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::models::{CaseSpec, ExpectSpec, Inference, RequestSpec};
use crate::parser::GoParser;

pub const DEFAULT_CASE_NAME: &str = "case01";
pub const DEFAULT_METHOD: &str = "POST";
pub const DEFAULT_STATUS: u16 = 200;
pub const DEFAULT_HARNESS_IMPORT: &str = "nofx/test/harness";

#[derive(Error, Debug)]
pub enum OverrideError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{json} (json err) / {yaml} (yaml err)")]
    SpecParseError {
        json: serde_json::Error,
        yaml: serde_yaml::Error,
    },
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("failed to create PrepareData dir: {0}")]
    PrepareDir(#[source] std::io::Error),

    #[error("failed to create CheckData dir: {0}")]
    CheckDir(#[source] std::io::Error),

    #[error("parse request spec failed: {0}")]
    RequestOverride(#[source] OverrideError),

    #[error("parse expect spec failed: {0}")]
    ExpectOverride(#[source] OverrideError),

    #[error("yaml marshal failed: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("write case.yml failed: {0}")]
    WriteCase(#[source] std::io::Error),

    #[error("write test file failed: {0}")]
    WriteStub(#[source] std::io::Error),
}

impl GeneratorError {
    /// Process exit status for each failure site. 2 is left to clap.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::PrepareDir(_) => 3,
            Self::CheckDir(_) => 4,
            Self::RequestOverride(_) => 5,
            Self::ExpectOverride(_) => 6,
            Self::Serialize(_) => 7,
            Self::WriteCase(_) => 8,
            Self::WriteStub(_) => 9,
        }
    }
}

/// Names the generated stub relies on in the Go test harness package
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessContract {
    pub import_path: String,
    pub base_type: String,
    pub capability: String,
    pub runner: String,
    pub env_field: String,
    pub url_method: String,
}

impl HarnessContract {
    pub fn new(import_path: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            ..Self::default()
        }
    }

    /// Package identifier, the last segment of the import path
    pub fn package(&self) -> &str {
        self.import_path.rsplit('/').next().unwrap_or(&self.import_path)
    }
}

impl Default for HarnessContract {
    fn default() -> Self {
        Self {
            import_path: DEFAULT_HARNESS_IMPORT.to_string(),
            base_type: "BaseTest".to_string(),
            capability: "TestCase".to_string(),
            runner: "RunCase".to_string(),
            env_field: "Env".to_string(),
            url_method: "URL".to_string(),
        }
    }
}

/// Files and directories written for one case
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPaths {
    pub handler_dir: PathBuf,
    pub case_dir: PathBuf,
    pub case_file: PathBuf,
    pub test_file: PathBuf,
}

/// Reads an override given inline or as `@path`. Blank input means no
/// override.
pub fn read_override_source(raw: &str) -> Result<Option<String>, OverrideError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .map(Some)
            .map_err(|source| OverrideError::Read {
                path: PathBuf::from(path),
                source,
            }),
        None => Ok(Some(raw.to_string())),
    }
}

/// Parses override text as JSON, falling back to YAML.
pub fn parse_override<T: DeserializeOwned>(text: &str) -> Result<T, OverrideError> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(json) => serde_yaml::from_str(text)
            .map_err(|yaml| OverrideError::SpecParseError { json, yaml }),
    }
}

fn load_override<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, OverrideError> {
    match raw.map(read_override_source).transpose()?.flatten() {
        Some(text) => parse_override(&text).map(Some),
        None => Ok(None),
    }
}

/// Upper-cases the first letter, `handleLogin` to `HandleLogin`
fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Produces the case descriptor and Go test stub for one handler
pub struct Generator {
    handler: String,
    case_name: String,
    test_root: PathBuf,
    harness: HarnessContract,
}

impl Generator {
    pub fn new(handler: impl Into<String>, case_name: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            case_name: case_name.into(),
            test_root: PathBuf::from("test"),
            harness: HarnessContract::default(),
        }
    }

    pub fn with_test_root(mut self, test_root: impl AsRef<Path>) -> Self {
        self.test_root = test_root.as_ref().to_path_buf();
        self
    }

    pub fn with_harness(mut self, harness: HarnessContract) -> Self {
        self.harness = harness;
        self
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    /// Where this case's files go under the test root
    pub fn paths(&self) -> GeneratedPaths {
        let handler_dir = self.test_root.join(&self.handler);
        let case_dir = handler_dir.join(&self.case_name);
        GeneratedPaths {
            case_file: case_dir.join("case.yml"),
            test_file: handler_dir.join(format!("{}_test.go", self.handler)),
            handler_dir,
            case_dir,
        }
    }

    /// Merges overrides, inferred fields and the resolved route into a fully
    /// populated case. Overrides win over inference, inference over defaults.
    pub fn synthesize(
        &self,
        request: Option<RequestSpec>,
        expect: Option<ExpectSpec>,
        inference: Inference,
        route: Option<String>,
    ) -> CaseSpec {
        let mut request = request.unwrap_or_default();
        let mut expect = expect.unwrap_or_default();

        if request.body.is_empty() {
            request.body = inference.request_fields;
        }
        if expect.body.is_empty() {
            expect.body = inference.response_fields;
        }

        if request.path.is_empty() {
            request.path = route
                .filter(|path| !path.is_empty())
                .unwrap_or_else(|| format!("/api/{}", self.handler));
        }
        if request.method.is_empty() {
            request.method = DEFAULT_METHOD.to_string();
        }
        if expect.status == 0 {
            expect.status = DEFAULT_STATUS;
        }

        CaseSpec {
            name: format!("{} {}", self.handler, self.case_name),
            request,
            expect,
        }
    }

    pub fn render_case(&self, case: &CaseSpec) -> Result<String, GeneratorError> {
        serde_yaml::to_string(case).map_err(GeneratorError::Serialize)
    }

    /// Renders the Go test stub. The test type holds the harness base as a
    /// named field and implements the harness capability interface itself.
    pub fn render_test_stub(&self) -> String {
        let title = title_case(&self.handler);
        let ty = format!("{}Test", title);
        let pkg = self.harness.package();
        let HarnessContract {
            import_path,
            base_type,
            capability,
            runner,
            env_field,
            url_method,
        } = &self.harness;

        format!(
            r#"// @Target({handler})
package {handler}

import (
	"testing"

	"{import_path}"
)

// {ty} implements {pkg}.{capability} by composing {pkg}.{base_type}.
type {ty} struct {{
	Base {pkg}.{base_type}
}}

var _ {pkg}.{capability} = (*{ty})(nil)

// Before runs the shared preparation, then reports the target environment.
func (rt *{ty}) Before(t *testing.T) {{
	rt.Base.Before(t)
	if rt.Base.{env_field} != nil {{
		t.Logf("TestEnv API URL: %s", rt.Base.{env_field}.{url_method}())
	}} else {{
		t.Log("Warning: {env_field} is nil in Before")
	}}
}}

// After is an optional cleanup/assertion hook.
func (rt *{ty}) After(t *testing.T) {{
	// no-op
}}

// @RunWith({case_name})
func Test{title}(t *testing.T) {{
	rt := &{ty}{{}}
	{pkg}.{runner}(t, rt, "{case_name}")
}}
"#,
            handler = self.handler,
            case_name = self.case_name,
        )
    }

    /// Runs the whole pipeline: creates the case layout, infers fields from
    /// the corpus, applies overrides and writes `case.yml` and the test stub.
    pub fn generate(
        &self,
        parser: &GoParser,
        request_raw: Option<&str>,
        expect_raw: Option<&str>,
    ) -> Result<GeneratedPaths, GeneratorError> {
        let paths = self.paths();

        fs::create_dir_all(paths.case_dir.join("PrepareData")).map_err(GeneratorError::PrepareDir)?;
        fs::create_dir_all(paths.case_dir.join("CheckData")).map_err(GeneratorError::CheckDir)?;

        let inference = parser.infer(&self.handler);
        debug!(
            "Inferred {} request and {} response fields",
            inference.request_fields.len(),
            inference.response_fields.len()
        );

        let request: Option<RequestSpec> =
            load_override(request_raw).map_err(GeneratorError::RequestOverride)?;
        let expect: Option<ExpectSpec> =
            load_override(expect_raw).map_err(GeneratorError::ExpectOverride)?;

        let needs_route = request.as_ref().map_or(true, |r| r.path.is_empty());
        let route = if needs_route {
            parser.find_route(&self.handler).map(|found| found.path)
        } else {
            None
        };
        if needs_route && route.is_none() {
            info!("No route registration found for {}, using default path", self.handler);
        }

        let case = self.synthesize(request, expect, inference, route);
        let yaml = self.render_case(&case)?;
        fs::write(&paths.case_file, yaml).map_err(GeneratorError::WriteCase)?;
        fs::write(&paths.test_file, self.render_test_stub()).map_err(GeneratorError::WriteStub)?;

        info!("Generated test scaffolding for '{}' at {:?}", self.handler, paths.handler_dir);
        Ok(paths)
    }
}
