use crate::errors::GenerateError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Terraform,
    Docker,
    GithubActions,
    Kubernetes,
    Prometheus,
    IamPolicy,
    Helm,
    Other,
}

/// How a generated result is named when it is offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Export {
    Extension(&'static str),
    FixedName(&'static str),
}

#[derive(Debug, Serialize)]
pub struct ToolTemplate {
    pub tool: Tool,
    pub id: &'static str,
    pub label: &'static str,
    pub default_prompt: &'static str,
    pub export: Export,
}

pub static TEMPLATES: [ToolTemplate; 8] = [
    ToolTemplate {
        tool: Tool::Terraform,
        id: "terraform",
        label: "Terraform",
        default_prompt: "Generate Terraform to create an EKS cluster with 2 node groups and S3 backend.",
        export: Export::Extension("tf"),
    },
    ToolTemplate {
        tool: Tool::Docker,
        id: "docker",
        label: "Docker",
        default_prompt: "Create a Dockerfile for a Python Flask app with gunicorn.",
        export: Export::FixedName("Dockerfile"),
    },
    ToolTemplate {
        tool: Tool::GithubActions,
        id: "github-actions",
        label: "CI/CD (GitHub Actions)",
        default_prompt: "Generate a GitHub Actions workflow to deploy a Node.js app to AWS EC2.",
        export: Export::Extension("yml"),
    },
    ToolTemplate {
        tool: Tool::Kubernetes,
        id: "kubernetes",
        label: "Kubernetes",
        default_prompt: "Generate Kubernetes Deployment and Service YAML for a Django app.",
        export: Export::Extension("yml"),
    },
    ToolTemplate {
        tool: Tool::Prometheus,
        id: "prometheus",
        label: "Monitoring (Prometheus)",
        default_prompt: "Write Prometheus alert rules for high CPU and memory usage.",
        export: Export::Extension("yml"),
    },
    ToolTemplate {
        tool: Tool::IamPolicy,
        id: "iam-policy",
        label: "IAM Policies",
        default_prompt: "Create an IAM policy allowing S3 read/write for a Lambda function.",
        export: Export::Extension("json"),
    },
    ToolTemplate {
        tool: Tool::Helm,
        id: "helm",
        label: "Helm Charts",
        default_prompt: "Create a Helm chart for a basic Go web app.",
        export: Export::Extension("yml"),
    },
    ToolTemplate {
        tool: Tool::Other,
        id: "other",
        label: "Other",
        default_prompt: "",
        export: Export::Extension("txt"),
    },
];

impl Tool {
    pub fn template(self) -> &'static ToolTemplate {
        TEMPLATES
            .iter()
            .find(|t| t.tool == self)
            .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1])
    }

    /// Accepts either the kebab-case id or the display label.
    pub fn from_id(value: &str) -> Option<Tool> {
        let value = value.trim();
        TEMPLATES
            .iter()
            .find(|t| t.id.eq_ignore_ascii_case(value) || t.label.eq_ignore_ascii_case(value))
            .map(|t| t.tool)
    }
}

impl Default for Tool {
    fn default() -> Self {
        TEMPLATES[0].tool
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.template().label)
    }
}

impl ToolTemplate {
    /// Extension without the leading dot; empty for fixed-name exports.
    pub fn file_extension(&self) -> &'static str {
        match self.export {
            Export::Extension(ext) => ext,
            Export::FixedName(_) => "",
        }
    }

    pub fn download_filename(&self) -> String {
        match self.export {
            Export::Extension(ext) => format!("generated.{}", ext),
            Export::FixedName(name) => name.to_string(),
        }
    }
}

pub fn select_tool(id: &str) -> Result<(&'static str, Export), GenerateError> {
    let tool = Tool::from_id(id).ok_or_else(|| GenerateError::UnknownTool(id.to_string()))?;
    let template = tool.template();
    Ok((template.default_prompt, template.export))
}
