use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Redirect, Response};
use bytes::Bytes;
use diesel::prelude::*;
use http::{HeaderMap, StatusCode};
use log::{error, info};

use crate::auth::RequestContext;
use crate::config::EllaSiteConfig;
use crate::errors::*;
use crate::forms::{Form, FormData};
use crate::handler::{EllaDB, WithDB};
use crate::interviews::{
    question_form, reply_form, save_answer, save_question, security_hash, security_hash_matches,
    HASH_FIELD, POST_STAGE, STAGE_FIELD,
};
use crate::models::{Category, Interview};
use crate::templates::{listing_templates, Templates};
use crate::view_models::{InterviewView, QuestionView};
use crate::DbPool;

const INTERVIEW_CONTENT_TYPE: &str = "interviews.interview";

/// The interview addressed by the URL and the context of whoever is asking for it.
struct InterviewPage {
    interview: Interview,
    category: Category,
    ctx: RequestContext,
}

fn load_page(
    db: &EllaDB,
    conn: &mut SqliteConnection,
    slug: &str,
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
) -> Result<InterviewPage, StatusCode> {
    let interview = Interview::by_slug(conn, slug).map_err(|e| db.handle_errors(e))?;
    let category = Category::get(conn, interview.category_id).map_err(|e| db.handle_errors(e))?;
    let ctx = RequestContext::load(conn, headers, remote).map_err(|e| db.handle_errors(e))?;
    Ok(InterviewPage {
        interview,
        category,
        ctx,
    })
}

fn render_page(templates: &Templates, page: &InterviewPage, name: &str) -> Result<Response, StatusCode> {
    let candidates = listing_templates(
        &page.category.tree_path,
        INTERVIEW_CONTENT_TYPE,
        &page.interview.slug,
        name,
    );
    let html = templates
        .add_context("interview", &InterviewView::from(&page.interview))
        .render_first(&candidates)
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;
    Ok(Html(html).into_response())
}

pub async fn get_interview_handler(
    slug: String,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;
    let page = load_page(&db, &mut conn, &slug, &headers, remote)?;

    let questions = page
        .interview
        .answered_questions(&mut conn)
        .map_err(|e| db.handle_errors(e))?;
    let can_reply = !page
        .interview
        .get_interviewees(&mut conn, &page.ctx)
        .map_err(|e| db.handle_errors(e))?
        .is_empty();

    let templates = templates
        .add_context("questions", &questions)
        .add_context("can_ask", &page.interview.can_ask())
        .add_context("can_reply", &can_reply);
    render_page(&templates, &page, "object.html")
}

pub async fn get_unanswered_handler(
    slug: String,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;
    let page = load_page(&db, &mut conn, &slug, &headers, remote)?;

    let questions = page
        .interview
        .unanswered_questions(&mut conn)
        .map_err(|e| db.handle_errors(e))?;

    let templates = templates
        .add_context("questions", &questions)
        .add_context("can_ask", &page.interview.can_ask());
    render_page(&templates, &page, "unanswered.html")
}

/// Every public question, for interviewees to pick from. Missing for anyone else.
pub async fn get_reply_list_handler(
    slug: String,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;
    let page = load_page(&db, &mut conn, &slug, &headers, remote)?;

    let interviewees = page
        .interview
        .get_interviewees(&mut conn, &page.ctx)
        .map_err(|e| db.handle_errors(e))?;
    if interviewees.is_empty() {
        return Err(NotFound.into());
    }
    let questions = page
        .interview
        .questions(&mut conn)
        .map_err(|e| db.handle_errors(e))?;

    let templates = templates
        .add_context("questions", &questions)
        .add_context("interviewees", &interviewees);
    render_page(&templates, &page, "reply.html")
}

/// Shows the answer form, or saves a submitted answer when `body` is given.
pub async fn reply_handler(
    slug: String,
    question_id: String,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: Option<Bytes>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
) -> Result<Response, StatusCode> {
    let question_id: i32 = question_id.parse().map_err(|_| NotFound)?;

    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;
    let page = load_page(&db, &mut conn, &slug, &headers, remote)?;

    let interviewees = page
        .interview
        .get_interviewees(&mut conn, &page.ctx)
        .map_err(|e| db.handle_errors(e))?;
    if interviewees.is_empty() {
        return Err(NotFound.into());
    }
    let question = page
        .interview
        .question(&mut conn, question_id)
        .map_err(|e| db.handle_errors(e))?;

    let mut form = reply_form(&interviewees);
    if let Some(body) = body {
        form = form.bind(FormData::from_bytes(&body));
        if form.is_valid() {
            save_answer(&mut conn, &question, &interviewees, &form)
                .map_err(|e| db.handle_errors(e))?;
            info!(
                "question {} of interview {} answered",
                question.id, page.interview.slug
            );
            return Ok(Redirect::to(&format!("/interviews/{}/reply/", slug)).into_response());
        }
    }

    let templates = templates
        .add_context("question", &QuestionView::new(question, vec![]))
        .add_context("form", &form.view());
    render_page(&templates, &page, "answer_form.html")
}

fn preview_hash_matches(secret: &str, form: &Form, data: &FormData) -> bool {
    data.get(HASH_FIELD)
        .map_or(false, |hash| security_hash_matches(secret, form, hash))
}

/// Question submission: the form, then a preview carrying a security hash,
/// then the confirmed save.
pub async fn ask_handler(
    slug: String,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: Option<Bytes>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
    config: Arc<EllaSiteConfig>,
) -> Result<Response, StatusCode> {
    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;
    let page = load_page(&db, &mut conn, &slug, &headers, remote)?;
    if !page.interview.can_ask() {
        return Err(NotFound.into());
    }

    let form = question_form(&page.ctx);
    let body = match body {
        Some(body) => body,
        None => {
            let templates = templates.add_context("form", &form.view());
            return render_page(&templates, &page, "ask_form.html");
        }
    };

    let data = FormData::from_bytes(&body);
    let form = form.bind(data.clone());
    if !form.is_valid() {
        let templates = templates.add_context("form", &form.view());
        return render_page(&templates, &page, "ask_form.html");
    }

    if data.get(STAGE_FIELD) == Some(POST_STAGE) {
        if preview_hash_matches(&config.secret_key, &form, &data) {
            save_question(&mut conn, &page.interview, &page.ctx, &form)
                .map_err(|e| db.handle_errors(e))?;
            info!(
                "question asked on interview {} from {}",
                page.interview.slug, page.ctx.ip_address
            );
            return Ok(Redirect::to(&format!("/interviews/{}/", slug)).into_response());
        }
        info!("stale preview hash on interview {}", page.interview.slug);
    }

    let templates = templates
        .add_context("form", &form.view())
        .add_context("stage_field", STAGE_FIELD)
        .add_context("hash_field", HASH_FIELD)
        .add_context("next_stage", POST_STAGE)
        .add_context("hash", &security_hash(&config.secret_key, &form));
    render_page(&templates, &page, "ask_preview.html")
}
