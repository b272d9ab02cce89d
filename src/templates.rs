use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::ser::Serialize;
use tera::{Context as TeraContext, Tera};

#[derive(Clone, Debug)]
pub struct Templates {
    tera: Arc<Tera>,
    ctx: TeraContext,
}

impl Templates {
    pub fn new(tera: Arc<Tera>, base_ctx: TeraContext) -> Self {
        Self { tera, ctx: base_ctx }
    }

    /// Loads every `*.html` below `dir` with the site-wide base context.
    pub fn from_dir<P: AsRef<Path>>(dir: P, site_name: &str) -> Result<Self> {
        let pattern = dir.as_ref().join("**/*.html");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| anyhow!("template directory is not valid utf-8"))?;
        let tera = Tera::new(pattern).context("loading templates")?;

        let mut base_ctx = TeraContext::new();
        base_ctx.insert("ELLA_RS_VERSION", env!("CARGO_PKG_VERSION"));
        base_ctx.insert("SITENAME", site_name);
        base_ctx.insert("MENUITEMS", crate::MENU_ITEMS);
        Ok(Self::new(Arc::new(tera), base_ctx))
    }

    pub fn add_context<T: Serialize + ?Sized>(&self, key: &str, val: &T) -> Templates {
        let mut new_ctx = self.ctx.clone();
        new_ctx.insert(key, val);

        Templates {
            tera: self.tera.clone(),
            ctx: new_ctx,
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str) -> Result<String> {
        self.tera
            .render(template, &self.ctx)
            .context("tera template rendering failed")
    }

    /// Renders the first candidate that exists.
    pub fn render_first(&self, candidates: &[String]) -> Result<String> {
        let template = candidates
            .iter()
            .find(|t| self.has_template(t))
            .ok_or_else(|| anyhow!("none of the templates {:?} exist", candidates))?;
        self.render(template)
    }
}

/// Template lookup order for an object page: the object's own slug, then its
/// category and each ancestor, then the content type, then the generic page.
pub fn listing_templates(tree_path: &str, content_type: &str, slug: &str, name: &str) -> Vec<String> {
    let mut candidates = vec![];
    let segments: Vec<&str> = tree_path.split('/').filter(|s| !s.is_empty()).collect();
    if !segments.is_empty() {
        candidates.push(format!(
            "page/category/{}/content_type/{}/{}/{}",
            segments.join("/"),
            content_type,
            slug,
            name
        ));
    }
    for end in (1..=segments.len()).rev() {
        candidates.push(format!(
            "page/category/{}/content_type/{}/{}",
            segments[..end].join("/"),
            content_type,
            name
        ));
    }
    candidates.push(format!("page/content_type/{}/{}", content_type, name));
    candidates.push(format!("page/{}", name));
    candidates
}

#[cfg(test)]
mod test {
    use super::listing_templates;
    use crate::test_util;

    #[test]
    fn it_walks_up_the_category_tree() {
        let candidates = listing_templates("news/world", "interviews.interview", "chat", "object.html");
        assert_eq!(
            candidates,
            vec![
                "page/category/news/world/content_type/interviews.interview/chat/object.html",
                "page/category/news/world/content_type/interviews.interview/object.html",
                "page/category/news/content_type/interviews.interview/object.html",
                "page/content_type/interviews.interview/object.html",
                "page/object.html",
            ]
        );
    }

    #[test]
    fn root_path_falls_back_to_content_type() {
        let candidates = listing_templates("", "interviews.interview", "chat", "reply.html");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], "page/content_type/interviews.interview/reply.html");
    }

    #[test]
    fn it_renders_the_first_existing_candidate() {
        let templates = test_util::templates();
        let candidates = listing_templates("news", "interviews.interview", "missing", "object.html");
        assert!(!templates.has_template(&candidates[0]));

        let page = templates
            .add_context("interview", &interview_ctx())
            .add_context("questions", &Vec::<String>::new())
            .add_context("can_ask", &false)
            .add_context("can_reply", &false)
            .render_first(&candidates)
            .unwrap();
        assert!(page.contains("Ella"));
        assert!(page.contains("A chat"));

        assert!(templates.render_first(&["nope.html".to_string()]).is_err());
    }

    fn interview_ctx() -> std::collections::HashMap<&'static str, &'static str> {
        [("title", "A chat"), ("slug", "chat"), ("perex", "")]
            .into_iter()
            .collect()
    }
}
