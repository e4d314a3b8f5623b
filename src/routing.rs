use crate::actors::copilot_session::{CopilotSessionActor, EditPrompt, Generate, Reset, SelectTool, Snapshot};
use crate::actors::health::{GetSystemHealth, HealthActor};
use crate::actors::registry::{Checkout, SessionRegistryActor};
use crate::errors::{GenerateError, Notice};
use crate::generation::SessionView;
use crate::session::copilot_session_id;
use crate::tools::{TEMPLATES, Tool};
use actix::{Addr, MailboxError};
use actix_session::Session;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, Responder, error, web};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ToolForm {
    pub tool: String,
}

#[derive(Deserialize)]
pub struct PromptForm {
    pub prompt: String,
}

#[derive(Deserialize, Default)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub tool: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    result: String,
    session: SessionView,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/tool", web::post().to(select_tool))
        .route("/generate", web::post().to(generate))
        .route("/reset", web::post().to(reset))
        .route("/download", web::get().to(download))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api")
                .route("/session", web::get().to(api_session))
                .route("/tools", web::get().to(api_tools))
                .route("/prompt", web::post().to(api_prompt))
                .route("/generate", web::post().to(api_generate))
                .route("/reset", web::post().to(api_reset)),
        );
}

fn mailbox_error(e: MailboxError) -> actix_web::Error {
    log::error!("A mailbox error occurred: {}. The session actor may have stopped.", e);
    error::ErrorInternalServerError("session unavailable")
}

async fn session_actor(
    session: &Session,
    registry: &Addr<SessionRegistryActor>,
) -> Result<Addr<CopilotSessionActor>, actix_web::Error> {
    let session_id = copilot_session_id(session)?;
    registry.send(Checkout { session_id }).await.map_err(mailbox_error)
}

async fn page(actor: &Addr<CopilotSessionActor>, notice: Option<Notice>) -> Result<HttpResponse, actix_web::Error> {
    let view = actor.send(Snapshot).await.map_err(mailbox_error)?;
    let html = match crate::templates::render_page(&view, notice.as_ref()) {
        Ok(html) => html,
        Err(e) => {
            return Ok(HttpResponse::InternalServerError()
                .content_type("text/html")
                .body(crate::templates::render_error_page(&e)));
        }
    };
    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(html))
}

pub async fn index(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    page(&actor, None).await
}

pub async fn select_tool(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
    form: web::Form<ToolForm>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let notice = match Tool::from_id(&form.tool) {
        Some(tool) => actor
            .send(SelectTool { tool })
            .await
            .map_err(mailbox_error)?
            .err()
            .map(|e| e.notice()),
        None => Some(GenerateError::UnknownTool(form.tool.clone()).notice()),
    };
    page(&actor, notice).await
}

pub async fn generate(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
    form: web::Form<PromptForm>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let outcome = actor
        .send(Generate {
            prompt: Some(form.into_inner().prompt),
        })
        .await
        .map_err(mailbox_error)?;
    let notice = match outcome {
        Ok(_) => None,
        Err(e) => Some(e.notice()),
    };
    page(&actor, notice).await
}

pub async fn reset(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    actor.send(Reset).await.map_err(mailbox_error)?;
    page(&actor, Some(Notice::info("Session reset."))).await
}

pub async fn download(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let view = actor.send(Snapshot).await.map_err(mailbox_error)?;

    let Some(code) = view.last_result else {
        return Ok(HttpResponse::NotFound().body("Nothing has been generated yet."));
    };

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(view.download_filename)],
        })
        .body(code))
}

pub async fn api_session(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let view = actor.send(Snapshot).await.map_err(mailbox_error)?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn api_tools() -> impl Responder {
    HttpResponse::Ok().json(&TEMPLATES)
}

pub async fn api_prompt(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
    body: web::Json<PromptForm>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let view = actor
        .send(EditPrompt {
            prompt: body.into_inner().prompt,
        })
        .await
        .map_err(mailbox_error)?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn api_generate(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
    body: Option<web::Json<GenerateRequest>>,
) -> Result<HttpResponse, actix_web::Error> {
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let actor = session_actor(&session, &registry).await?;

    if let Some(tool_id) = &request.tool {
        let tool = Tool::from_id(tool_id).ok_or_else(|| GenerateError::UnknownTool(tool_id.clone()))?;
        actor.send(SelectTool { tool }).await.map_err(mailbox_error)??;
    }

    let result = actor
        .send(Generate { prompt: request.prompt })
        .await
        .map_err(mailbox_error)??;
    let view = actor.send(Snapshot).await.map_err(mailbox_error)?;

    Ok(HttpResponse::Ok().json(GenerateResponse { result, session: view }))
}

pub async fn api_reset(
    session: Session,
    registry: web::Data<Addr<SessionRegistryActor>>,
) -> Result<HttpResponse, actix_web::Error> {
    let actor = session_actor(&session, &registry).await?;
    let view = actor.send(Reset).await.map_err(mailbox_error)?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn health_check(health_actor: web::Data<Addr<HealthActor>>) -> impl Responder {
    match health_actor.send(GetSystemHealth).await {
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            log::error!("Could not retrieve system health: {}. The health actor might be experiencing issues.", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::health::HealthActor;
    use crate::errors::CompletionError;
    use crate::generation::GenerationSettings;
    use crate::generation::testing::ScriptedClient;
    use actix::Actor;
    use actix_session::SessionMiddleware;
    use actix_session::storage::CookieSessionStore;
    use actix_web::cookie::{Cookie, Key};
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use std::sync::Arc;
    use std::time::Duration;

    const COOKIE_NAME: &str = "test_session";

    macro_rules! app {
        ($client:expr) => {{
            let health = HealthActor::new().start();
            let settings = GenerationSettings {
                timeout: Duration::from_millis(500),
                ..GenerationSettings::default()
            };
            let registry = SessionRegistryActor::new(
                $client,
                Arc::new(settings),
                Some(health.clone()),
                Duration::from_secs(600),
            )
            .start();
            test::init_service(
                App::new()
                    .app_data(web::Data::new(registry))
                    .app_data(web::Data::new(health))
                    .configure(configure)
                    .wrap(
                        SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                            .cookie_name(COOKIE_NAME.to_string())
                            .cookie_secure(false)
                            .build(),
                    ),
            )
            .await
        }};
    }

    fn session_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|c| c.name() == COOKIE_NAME)
            .expect("session cookie")
            .into_owned()
    }

    #[actix_rt::test]
    async fn test_index_renders_page() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("DevOps Copilot"));
        assert!(html.contains("Requests used: 0 / 5"));
    }

    #[actix_rt::test]
    async fn test_api_generate_and_download() {
        let client = Arc::new(ScriptedClient::replying("resource \"aws_s3_bucket\" \"b\" {}"));
        let app = app!(client.clone());

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"tool": "terraform", "prompt": "Generate an S3 bucket"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["result"], "resource \"aws_s3_bucket\" \"b\" {}");
        assert_eq!(body["session"]["request_count"], 1);
        assert_eq!(body["session"]["prompt"], "Generate an S3 bucket");

        let req = test::TestRequest::get().uri("/download").cookie(cookie).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("attachment"));
        assert!(disposition.contains("generated.tf"));
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"resource \"aws_s3_bucket\" \"b\" {}");
        assert_eq!(client.calls(), 1);
    }

    #[actix_rt::test]
    async fn test_download_keeps_name_after_tool_switch() {
        let app = app!(Arc::new(ScriptedClient::replying("terraform {}")));

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"tool": "terraform"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::post()
            .uri("/tool")
            .cookie(cookie.clone())
            .set_form([("tool", "docker")])
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<h2>Terraform</h2>"));
        assert!(html.contains("Download generated.tf"));

        let req = test::TestRequest::get().uri("/download").cookie(cookie).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap().to_string();
        assert!(disposition.contains("generated.tf"));
        assert!(!disposition.contains("Dockerfile"));
    }

    #[actix_rt::test]
    async fn test_api_generate_empty_prompt() {
        let client = Arc::new(ScriptedClient::replying("unused"));
        let app = app!(client.clone());

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"tool": "docker", "prompt": "   "}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation");
        assert_eq!(client.calls(), 0);
    }

    #[actix_rt::test]
    async fn test_api_generate_unknown_tool() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));

        let req = test::TestRequest::post()
            .uri("/api/generate")
            .set_json(serde_json::json!({"tool": "pulumi"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_quota_exceeded_over_http() {
        let app = app!(Arc::new(ScriptedClient::replying("ok")));

        let resp = test::call_service(&app, test::TestRequest::post().uri("/api/generate").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp);

        for _ in 0..4 {
            let req = test::TestRequest::post().uri("/api/generate").cookie(cookie.clone()).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = test::TestRequest::post().uri("/api/generate").cookie(cookie.clone()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let req = test::TestRequest::post().uri("/api/reset").cookie(cookie.clone()).to_request();
        let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["request_count"], 0);
        assert!(view["last_result"].is_null());
    }

    #[actix_rt::test]
    async fn test_completion_failure_over_http() {
        let app = app!(Arc::new(ScriptedClient::new(vec![Err(CompletionError::Timeout(
            Duration::from_secs(45)
        ))])));

        let resp = test::call_service(&app, test::TestRequest::post().uri("/api/generate").to_request()).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::get().uri("/api/session").cookie(cookie).to_request();
        let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["request_count"], 0);
        assert_eq!(view["phase"], "failed");
        assert!(view["last_result"].is_null());
    }

    #[actix_rt::test]
    async fn test_form_generate_shows_warning() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));

        let req = test::TestRequest::post()
            .uri("/generate")
            .set_form([("prompt", "")])
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();

        assert!(html.contains("notice-warning"));
        assert!(html.contains("Please enter a prompt."));
    }

    #[actix_rt::test]
    async fn test_form_tool_switch_overwrites_prompt() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));

        let req = test::TestRequest::post()
            .uri("/tool")
            .set_form([("tool", "kubernetes")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::get().uri("/api/session").cookie(cookie).to_request();
        let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["tool"], "kubernetes");
        assert_eq!(view["prompt"], Tool::Kubernetes.template().default_prompt);
    }

    #[actix_rt::test]
    async fn test_api_prompt_then_generate_uses_edited_prompt() {
        let app = app!(Arc::new(ScriptedClient::replying("apiVersion: v1")));

        let req = test::TestRequest::post()
            .uri("/api/prompt")
            .set_json(serde_json::json!({"prompt": "A ConfigMap named app-config"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::post().uri("/api/generate").cookie(cookie).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["session"]["prompt"], "A ConfigMap named app-config");
        assert_eq!(body["result"], "apiVersion: v1");
    }

    #[actix_rt::test]
    async fn test_download_before_generation() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));
        let resp = test::call_service(&app, test::TestRequest::get().uri("/download").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_api_tools_lists_templates() {
        let app = app!(Arc::new(ScriptedClient::replying("unused")));
        let req = test::TestRequest::get().uri("/api/tools").to_request();
        let tools: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(tools.as_array().unwrap().len(), TEMPLATES.len());
        assert_eq!(tools[1]["export"]["value"], "Dockerfile");
    }

    #[actix_rt::test]
    async fn test_health_endpoint() {
        let app = app!(Arc::new(ScriptedClient::replying("ok")));
        let resp = test::call_service(&app, test::TestRequest::post().uri("/api/generate").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["thirty_seconds"]["succeeded"], 1);
        assert_eq!(health["active_sessions"], 1);
    }
}
