use std::net::SocketAddr;
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Redirect, Response};
use bytes::Bytes;
use diesel::prelude::*;
use http::{HeaderMap, StatusCode};
use log::{error, info};

use crate::admin::{placement_admin, tag_admin, InlineAdmin, InlineModel};
use crate::auth::RequestContext;
use crate::content_types::{self, GenericTarget};
use crate::errors::*;
use crate::forms::FormData;
use crate::handler::{EllaDB, WithDB};
use crate::models::ContentType;
use crate::templates::Templates;
use crate::DbPool;

/// Path segments of `/admin/inlines/:inline/:app_label/:model/:object_id/`.
pub struct InlineTarget {
    pub inline: String,
    pub app_label: String,
    pub model: String,
    pub object_id: String,
}

impl InlineTarget {
    fn url(&self) -> String {
        format!(
            "/admin/inlines/{}/{}/{}/{}/",
            self.inline, self.app_label, self.model, self.object_id
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn edit_inline<M: InlineModel>(
    db: &EllaDB,
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    admin: InlineAdmin<M>,
    parent_ct: &ContentType,
    object_id: i32,
    target: &GenericTarget,
    data: Option<FormData>,
    url: &str,
    templates: &Templates,
) -> Result<Response, StatusCode> {
    let posted = data.is_some();
    let formset = admin
        .formset(conn, ctx, parent_ct, object_id, data)
        .map_err(|e| db.handle_errors(e))?;

    if posted && formset.is_valid() {
        let summary = db.run_txn(conn, |conn| formset.save(conn))?;
        info!(
            "{}.{} inlines of {} {}: {:?}",
            M::APP_LABEL,
            M::MODEL,
            parent_ct.natural_key(),
            object_id,
            summary
        );
        return Ok(Redirect::to(url).into_response());
    }

    let page = templates
        .add_context("formset", &formset.view())
        .add_context("target", target)
        .add_context("target_title", target.title())
        .add_context("action", url)
        .render(admin.template.path())
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;
    Ok(Html(page).into_response())
}

/// Staff-only editor for the placements or tags hanging off any publishable or interview.
pub async fn inline_handler(
    target: InlineTarget,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: Option<Bytes>,
    pool: Arc<DbPool>,
    templates: Arc<Templates>,
) -> Result<Response, StatusCode> {
    let db = EllaDB::new(pool);
    let mut conn = db.dbconn()?;

    let ctx = RequestContext::load(&mut conn, &headers, remote).map_err(|e| db.handle_errors(e))?;
    if !ctx.user.is_staff() {
        return Err(NotAuthorized.into());
    }

    let object_id: i32 = target.object_id.parse().map_err(|_| NotFound)?;
    let parent_ct = ContentType::get_by_natural_key(&mut conn, &target.app_label, &target.model)
        .map_err(|e| db.handle_errors(e))?;
    let parent = content_types::resolve(&mut conn, &parent_ct, object_id)
        .map_err(|e| db.handle_errors(e))?
        .ok_or(NotFound)?;

    let data = body.map(|b| FormData::from_bytes(&b));
    let url = target.url();
    match target.inline.as_str() {
        "placements" => edit_inline(
            &db, &mut conn, &ctx, placement_admin(), &parent_ct, object_id, &parent, data, &url, &templates,
        ),
        "tags" => edit_inline(
            &db, &mut conn, &ctx, tag_admin(), &parent_ct, object_id, &parent, data, &url, &templates,
        ),
        _ => Err(NotFound.into()),
    }
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use diesel::prelude::*;
    use http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::models::{ContentType, Placement};
    use crate::schema::core_placement;
    use crate::test_util;

    struct Setup {
        app: axum::Router,
        pool: std::sync::Arc<crate::DbPool>,
        staff_key: String,
        reader_key: String,
        url: String,
        placement: Placement,
    }

    fn setup() -> Setup {
        let pool = test_util::pool();
        let app = crate::router(pool.clone(), test_util::templates(), test_util::config());
        let mut conn = pool.get().unwrap();
        let news = test_util::create_category(&mut conn, "News", "news", None);
        let interview = test_util::create_interview(&mut conn, "chat", &news);
        let ct = ContentType::get_by_natural_key(&mut conn, "interviews", "interview").unwrap();
        let placement = test_util::create_placement(&mut conn, ct.id, interview.id, &news, "chat");

        let staff = test_util::create_user(&mut conn, "editor", true, true);
        let reader = test_util::create_user(&mut conn, "reader", false, false);
        let staff_key = test_util::create_session(&mut conn, &staff);
        let reader_key = test_util::create_session(&mut conn, &reader);
        drop(conn);

        Setup {
            app,
            pool,
            staff_key,
            reader_key,
            url: format!("/admin/inlines/placements/interviews/interview/{}/", interview.id),
            placement,
        }
    }

    fn request(method: &str, uri: &str, key: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, format!("sessionid={}", key))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn only_staff_may_edit_inlines() {
        let s = setup();
        let res = s
            .app
            .clone()
            .oneshot(request("GET", &s.url, &s.reader_key, String::new()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = s
            .app
            .oneshot(request("GET", &s.url, &s.staff_key, String::new()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_targets_are_missing() {
        let s = setup();
        for uri in [
            "/admin/inlines/placements/interviews/interview/999/",
            "/admin/inlines/placements/interviews/interview/abc/",
            "/admin/inlines/placements/nope/nothing/1/",
            "/admin/inlines/authors/interviews/interview/1/",
        ] {
            let res = s
                .app
                .clone()
                .oneshot(request("GET", uri, &s.staff_key, String::new()))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn valid_posts_save_and_redirect() {
        let s = setup();
        let prefix = "core-placement-content_type-object_id";
        let body = format!(
            "{p}-TOTAL_FORMS=1&{p}-INITIAL_FORMS=1&{p}-0-id={id}&{p}-0-category={cat}\
             &{p}-0-publish_from=2000-01-01+00%3A00%3A00&{p}-0-slug=renamed",
            p = prefix,
            id = s.placement.id,
            cat = s.placement.category_id,
        );
        let res = s
            .app
            .oneshot(request("POST", &s.url, &s.staff_key, body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], s.url.as_str());

        let mut conn = s.pool.get().unwrap();
        let slug: String = core_placement::table
            .find(s.placement.id)
            .select(core_placement::slug)
            .first(&mut conn)
            .unwrap();
        assert_eq!(slug, "renamed");
    }

    #[tokio::test]
    async fn tampered_management_form_is_rerendered() {
        let s = setup();
        let res = s
            .app
            .oneshot(request("POST", &s.url, &s.staff_key, "junk=1".into()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
