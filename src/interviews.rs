//! Interview questions and answers.
//!
//! Visitors ask through a preview then confirm flow; interviewees answer
//! inside the reply window. Anyone who may not reply sees the reply pages as
//! missing.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use sha2::{Digest, Sha256};

use crate::auth::RequestContext;
use crate::forms::{Choice, FieldKind, FieldSpec, Form, FormField};
use crate::models::{
    parse_db_datetime, Answer, Interview, Interviewee, NewAnswer, NewQuestion, Question,
};
use crate::schema::{
    interviews_answer, interviews_interview_interviewees, interviews_interviewee,
    interviews_question,
};
use crate::view_models::{AnswerView, QuestionView};

pub const CHANGE_INTERVIEW_PERM: &str = "interviews.change_interview";

pub const STAGE_FIELD: &str = "stage";
pub const HASH_FIELD: &str = "hash";
pub const PREVIEW_STAGE: &str = "1";
pub const POST_STAGE: &str = "2";

const QUESTION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "nickname",
        label: "Nickname",
        kind: FieldKind::Text { max_length: 200 },
        required: true,
    },
    FieldSpec {
        name: "email",
        label: "E-mail",
        kind: FieldKind::Email { max_length: 75 },
        required: false,
    },
    FieldSpec {
        name: "content",
        label: "Question",
        kind: FieldKind::TextArea,
        required: true,
    },
];

const REPLY_CONTENT: FieldSpec = FieldSpec {
    name: "content",
    label: "Answer",
    kind: FieldKind::TextArea,
    required: true,
};

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn within(from: &str, to: &str, now: NaiveDateTime) -> bool {
    match (parse_db_datetime(from), parse_db_datetime(to)) {
        (Ok(from), Ok(to)) => from <= now && now < to,
        _ => false,
    }
}

impl Interview {
    pub fn can_ask_at(&self, now: NaiveDateTime) -> bool {
        within(&self.ask_from, &self.ask_to, now)
    }

    pub fn can_ask(&self) -> bool {
        self.can_ask_at(now())
    }

    pub fn can_reply_at(&self, now: NaiveDateTime) -> bool {
        within(&self.reply_from, &self.reply_to, now)
    }

    pub fn can_reply(&self) -> bool {
        self.can_reply_at(now())
    }

    pub fn interviewees(&self, conn: &mut SqliteConnection) -> QueryResult<Vec<Interviewee>> {
        interviews_interviewee::table
            .inner_join(interviews_interview_interviewees::table)
            .filter(interviews_interview_interviewees::interview_id.eq(self.id))
            .order(interviews_interviewee::id.asc())
            .select(Interviewee::as_select())
            .load(conn)
    }

    /// Interviewees `ctx` may answer as. Empty outside the reply window.
    pub fn get_interviewees(
        &self,
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
    ) -> QueryResult<Vec<Interviewee>> {
        self.get_interviewees_at(conn, ctx, now())
    }

    pub fn get_interviewees_at(
        &self,
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
        now: NaiveDateTime,
    ) -> QueryResult<Vec<Interviewee>> {
        let user = match ctx.user.user() {
            Some(user) if self.can_reply_at(now) => user,
            _ => return Ok(vec![]),
        };
        let all = self.interviewees(conn)?;
        if ctx.permissions.has_object_permission(CHANGE_INTERVIEW_PERM) {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|i| i.user_id == Some(user.id))
            .collect())
    }

    pub fn question(&self, conn: &mut SqliteConnection, question_id: i32) -> QueryResult<Question> {
        interviews_question::table
            .filter(interviews_question::id.eq(question_id))
            .filter(interviews_question::interview_id.eq(self.id))
            .select(Question::as_select())
            .first(conn)
    }

    /// Public questions with their answers, oldest first.
    pub fn questions(&self, conn: &mut SqliteConnection) -> QueryResult<Vec<QuestionView>> {
        let questions: Vec<Question> = interviews_question::table
            .filter(interviews_question::interview_id.eq(self.id))
            .filter(interviews_question::is_public.eq(true))
            .order((interviews_question::submit_date.asc(), interviews_question::id.asc()))
            .select(Question::as_select())
            .load(conn)?;
        let ids: Vec<i32> = questions.iter().map(|q| q.id).collect();
        let answers: Vec<(Answer, Interviewee)> = interviews_answer::table
            .inner_join(interviews_interviewee::table)
            .filter(interviews_answer::question_id.eq_any(ids))
            .order(interviews_answer::id.asc())
            .select((Answer::as_select(), Interviewee::as_select()))
            .load(conn)?;

        Ok(questions
            .into_iter()
            .map(|q| {
                let answers = answers
                    .iter()
                    .filter(|(a, _)| a.question_id == q.id)
                    .map(|(a, i)| AnswerView::new(a, i))
                    .collect();
                QuestionView::new(q, answers)
            })
            .collect())
    }

    pub fn answered_questions(&self, conn: &mut SqliteConnection) -> QueryResult<Vec<QuestionView>> {
        Ok(self
            .questions(conn)?
            .into_iter()
            .filter(|q| !q.answers.is_empty())
            .collect())
    }

    pub fn unanswered_questions(&self, conn: &mut SqliteConnection) -> QueryResult<Vec<QuestionView>> {
        Ok(self
            .questions(conn)?
            .into_iter()
            .filter(|q| q.answers.is_empty())
            .collect())
    }
}

/// Nickname and e-mail are only asked of anonymous visitors.
pub fn question_form(ctx: &RequestContext) -> Form {
    let mut form = Form::new(QUESTION_FIELDS.iter().map(FormField::from).collect());
    if ctx.user.is_authenticated() {
        form.remove_field("nickname");
        form.remove_field("email");
    }
    form
}

/// A choice of interviewee is only offered when there is more than one to answer as.
pub fn reply_form(interviewees: &[Interviewee]) -> Form {
    let mut fields = vec![FormField::from(&REPLY_CONTENT)];
    if interviewees.len() > 1 {
        let choices = interviewees
            .iter()
            .map(|i| Choice::new(i.id, i.name.as_str()))
            .collect();
        fields.push(FormField::choice("interviewee", "Interviewee", true, choices));
    }
    Form::new(fields)
}

/// Digest of the previewed values, keyed with the site secret.
pub fn security_hash(secret: &str, form: &Form) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    for field in form.fields() {
        let value = form.raw_value(field.name).unwrap_or("").trim();
        hasher.update(field.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Compares `candidate` with the form's hash without stopping at the first differing byte.
pub fn security_hash_matches(secret: &str, form: &Form, candidate: &str) -> bool {
    let expected = security_hash(secret, form);
    if expected.len() != candidate.len() {
        return false;
    }
    expected
        .bytes()
        .zip(candidate.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

pub fn save_question(
    conn: &mut SqliteConnection,
    interview: &Interview,
    ctx: &RequestContext,
    form: &Form,
) -> QueryResult<usize> {
    let data = form.cleaned_data();
    let user = ctx.user.user();
    let nickname = match user {
        Some(user) => user.username.as_str(),
        None => data.text("nickname").unwrap_or(""),
    };
    diesel::insert_into(interviews_question::table)
        .values(NewQuestion {
            interview_id: interview.id,
            user_id: user.map(|u| u.id),
            nickname,
            email: data.text("email").unwrap_or(""),
            content: data.text("content").unwrap_or(""),
            ip_address: &ctx.ip_address,
        })
        .execute(conn)
}

/// Saves the answer as the only interviewee, or the one picked on the form.
pub fn save_answer(
    conn: &mut SqliteConnection,
    question: &Question,
    interviewees: &[Interviewee],
    form: &Form,
) -> QueryResult<usize> {
    let data = form.cleaned_data();
    let interviewee_id = match interviewees {
        [only] => Some(only.id),
        _ => data
            .integer("interviewee")
            .filter(|id| interviewees.iter().any(|i| i.id == *id)),
    };
    let interviewee_id = interviewee_id.ok_or(diesel::result::Error::NotFound)?;
    diesel::insert_into(interviews_answer::table)
        .values(NewAnswer {
            question_id: question.id,
            interviewee_id,
            content: data.text("content").unwrap_or(""),
        })
        .execute(conn)
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;

    use super::{question_form, reply_form, security_hash, security_hash_matches};
    use crate::auth::RequestContext;
    use crate::forms::FormData;
    use crate::test_util;

    #[test]
    fn windows_are_half_open() {
        let mut conn = test_util::connection();
        let category = test_util::create_category(&mut conn, "News", "news", None);
        let mut interview = test_util::create_interview(&mut conn, "chat", &category);
        interview.ask_from = "2009-01-01 10:00:00".into();
        interview.ask_to = "2009-01-02 10:00:00".into();

        let at = |d: u32, h: u32| NaiveDate::from_ymd_opt(2009, 1, d).unwrap().and_hms_opt(h, 0, 0).unwrap();
        assert!(!interview.can_ask_at(at(1, 9)));
        assert!(interview.can_ask_at(at(1, 10)));
        assert!(!interview.can_ask_at(at(2, 10)));
        assert!(interview.can_reply_at(at(1, 9)));
    }

    #[test]
    fn interviewees_depend_on_the_user() {
        let mut conn = test_util::connection();
        let category = test_util::create_category(&mut conn, "News", "news", None);
        let interview = test_util::create_interview(&mut conn, "chat", &category);
        let alice = test_util::create_user(&mut conn, "alice", false, false);
        let editor = test_util::create_user(&mut conn, "editor", false, true);
        test_util::grant(&mut conn, &editor, "interviews.change_interview");
        let as_alice = test_util::create_interviewee(&mut conn, &interview, "Alice", Some(&alice));
        test_util::create_interviewee(&mut conn, &interview, "Bob", None);

        let anonymous = RequestContext::anonymous("127.0.0.1");
        assert!(interview.get_interviewees(&mut conn, &anonymous).unwrap().is_empty());

        let ctx = RequestContext::for_user(&mut conn, alice, "127.0.0.1").unwrap();
        assert_eq!(interview.get_interviewees(&mut conn, &ctx).unwrap(), vec![as_alice]);

        let ctx = RequestContext::for_user(&mut conn, editor, "127.0.0.1").unwrap();
        assert_eq!(interview.get_interviewees(&mut conn, &ctx).unwrap().len(), 2);

        let closed = NaiveDate::from_ymd_opt(3000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(interview.get_interviewees_at(&mut conn, &ctx, closed).unwrap().is_empty());
    }

    #[test]
    fn authenticated_askers_skip_nickname_and_email() {
        let mut conn = test_util::connection();
        let user = test_util::create_user(&mut conn, "reader", false, false);
        let ctx = RequestContext::for_user(&mut conn, user, "127.0.0.1").unwrap();

        let names: Vec<&str> = question_form(&ctx).fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["content"]);

        let anonymous = RequestContext::anonymous("127.0.0.1");
        let mut data = FormData::default();
        data.insert("content", "Why?");
        let form = question_form(&anonymous).bind(data);
        assert!(!form.is_valid());
        assert!(form.errors().contains_key("nickname"));
    }

    #[test]
    fn reply_form_asks_for_interviewee_only_when_ambiguous() {
        let mut conn = test_util::connection();
        let category = test_util::create_category(&mut conn, "News", "news", None);
        let interview = test_util::create_interview(&mut conn, "chat", &category);
        let alice = test_util::create_interviewee(&mut conn, &interview, "Alice", None);
        assert!(reply_form(&[alice.clone()]).field("interviewee").is_none());

        let bob = test_util::create_interviewee(&mut conn, &interview, "Bob", None);
        let form = reply_form(&[alice, bob.clone()]);
        let field = form.field("interviewee").unwrap();
        assert!(field.required);
        assert_eq!(field.choices.len(), 2);

        let mut data = FormData::default();
        data.insert("content", "Sure.");
        data.insert("interviewee", bob.id.to_string());
        assert!(form.bind(data).is_valid());
    }

    #[test]
    fn security_hash_tracks_values_and_secret() {
        let anonymous = RequestContext::anonymous("127.0.0.1");
        let mut data = FormData::default();
        data.insert("nickname", "Bob");
        data.insert("content", "Why?");
        let form = question_form(&anonymous).bind(data.clone());

        let hash = security_hash("s3cret", &form);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, security_hash("s3cret", &question_form(&anonymous).bind(data.clone())));
        assert_ne!(hash, security_hash("other", &form));

        data.insert("content", "Why not?");
        assert_ne!(hash, security_hash("s3cret", &question_form(&anonymous).bind(data)));
    }

    #[test]
    fn hash_checks_need_the_exact_digest() {
        let anonymous = RequestContext::anonymous("127.0.0.1");
        let mut data = FormData::default();
        data.insert("nickname", "Bob");
        data.insert("content", "Why?");
        let form = question_form(&anonymous).bind(data);

        let hash = security_hash("s3cret", &form);
        assert!(security_hash_matches("s3cret", &form, &hash));
        assert!(!security_hash_matches("s3cret", &form, &hash[..63]));
        assert!(!security_hash_matches("s3cret", &form, ""));
        let mut flipped = hash.clone().into_bytes();
        flipped[63] = if flipped[63] == b'0' { b'1' } else { b'0' };
        assert!(!security_hash_matches("s3cret", &form, &String::from_utf8(flipped).unwrap()));
        assert!(!security_hash_matches("other", &form, &hash));
    }
}
