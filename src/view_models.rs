use serde::{Deserialize, Serialize};

use crate::models::{parse_db_datetime, Answer, Interview, Interviewee, Question};

#[derive(Debug, Serialize, Deserialize)]
pub struct Date {
    year: i32,
    month: u32,
    day: u32,
    date: String,
    time: String,
}

impl<T> std::convert::From<&T> for Date
where
    T: chrono::Datelike + chrono::Timelike,
{
    fn from(date: &T) -> Self {
        let date_str = format!("{}-{:02}-{:02}", date.year(), date.month(), date.day());
        let time_str = format!("{:02}:{:02}", date.hour(), date.minute());
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            date: date_str,
            time: time_str,
        }
    }
}

fn submitted(value: &str) -> Option<Date> {
    parse_db_datetime(value).ok().map(|dt| Date::from(&dt))
}

#[derive(Debug, Serialize)]
pub struct InterviewView {
    pub title: String,
    pub slug: String,
    pub perex: String,
    pub url: String,
}

impl From<&Interview> for InterviewView {
    fn from(interview: &Interview) -> Self {
        Self {
            title: interview.title.clone(),
            slug: interview.slug.clone(),
            perex: interview.perex.clone(),
            url: format!("/interviews/{}/", interview.slug),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnswerView {
    pub id: i32,
    pub interviewee: String,
    pub content: String,
    pub submitted: Option<Date>,
}

impl AnswerView {
    pub fn new(answer: &Answer, interviewee: &Interviewee) -> Self {
        Self {
            id: answer.id,
            interviewee: interviewee.name.clone(),
            content: answer.content.clone(),
            submitted: submitted(&answer.submit_date),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i32,
    pub nickname: String,
    pub content: String,
    pub submitted: Option<Date>,
    pub answers: Vec<AnswerView>,
}

impl QuestionView {
    pub fn new(question: Question, answers: Vec<AnswerView>) -> Self {
        Self {
            id: question.id,
            nickname: question.nickname,
            content: question.content,
            submitted: submitted(&question.submit_date),
            answers,
        }
    }
}
