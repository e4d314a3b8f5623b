use crate::errors::Notice;
use crate::generation::SessionView;
use crate::tools::{TEMPLATES, ToolTemplate};
use minijinja::{Environment, context};
use once_cell::sync::Lazy;

static INDEX_TEMPLATE: &str = include_str!("index.html");

static JINJA_ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    if let Err(e) = env.add_template("index.html", INDEX_TEMPLATE) {
        log::error!("Failed to compile the page template: {}", e);
    }
    env
});

pub fn render_page(session: &SessionView, notice: Option<&Notice>) -> Result<String, minijinja::Error> {
    render_with(session, &TEMPLATES, notice)
}

fn render_with(
    session: &SessionView,
    tools: &[ToolTemplate],
    notice: Option<&Notice>,
) -> Result<String, minijinja::Error> {
    let tmpl = JINJA_ENV.get_template("index.html")?;
    tmpl.render(context! {
        session => session,
        tools => tools,
        notice => notice,
    })
}

pub fn render_error_page(error: &minijinja::Error) -> String {
    log::error!("Could not render the page: {}", error);
    "<h1>Internal Server Error</h1><p>An unexpected error occurred.</p>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GenerateError;
    use crate::generation::CopilotSession;
    use crate::tools::Tool;

    #[test]
    fn test_render_fresh_session() {
        let session = CopilotSession::new(Tool::Terraform, 5);
        let html = render_page(&session.view(), None).unwrap();

        assert!(html.contains("DevOps Copilot"));
        assert!(html.contains("Requests used: 0 / 5"));
        assert!(html.contains("<option value=\"terraform\" selected>Terraform</option>"));
        assert!(!html.contains("/download\""));
        assert!(!html.contains("disabled"));
    }

    #[test]
    fn test_result_is_escaped_and_downloadable() {
        let mut session = CopilotSession::new(Tool::Docker, 5);
        let pending = session.begin_generation().unwrap();
        session
            .finish_generation(&pending, Ok("RUN echo \"<ok>\" > /tmp/x".to_string()))
            .unwrap();

        let html = render_page(&session.view(), None).unwrap();

        assert!(html.contains("&lt;ok&gt;"));
        assert!(!html.contains("<ok>"));
        assert!(html.contains("Download Dockerfile"));
        assert!(html.contains("Requests used: 1 / 5"));
    }

    #[test]
    fn test_selector_disabled_while_generating() {
        let mut session = CopilotSession::new(Tool::Helm, 5);
        session.begin_generation().unwrap();

        let html = render_page(&session.view(), None).unwrap();

        assert!(html.contains("name=\"tool\" onchange=\"this.form.submit()\" disabled"));
        assert!(html.contains("Generating code..."));
    }

    #[test]
    fn test_notice_is_rendered() {
        let session = CopilotSession::new(Tool::Other, 5);
        let notice = GenerateError::EmptyPrompt.notice();

        let html = render_page(&session.view(), Some(&notice)).unwrap();

        assert!(html.contains("notice-warning"));
        assert!(html.contains("Please enter a prompt."));
    }

    #[test]
    fn test_render_error_page() {
        let error = minijinja::Error::new(minijinja::ErrorKind::TemplateNotFound, "missing");
        assert_eq!(
            render_error_page(&error),
            "<h1>Internal Server Error</h1><p>An unexpected error occurred.</p>"
        );
    }
}
