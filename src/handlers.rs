mod admin;
mod interviews;

pub use admin::{inline_handler, InlineTarget};
pub use interviews::{
    ask_handler, get_interview_handler, get_reply_list_handler, get_unanswered_handler,
    reply_handler,
};
