//! Shared test data.

use agora_domain::comments::NewComment;
use agora_domain::posts::{NewPost, Post};
use agora_domain::{PostId, UserId};
use chrono::{DateTime, TimeZone, Utc};

pub const USER_ID: &str = "5cf37266-3473-4006-984f-9325122678b7";

/// Fixed clock value so records compare deterministically.
pub fn test_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn new_post(title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        description: format!("{} description", title),
        user_id: USER_ID.to_string(),
    }
}

/// A post as it would arrive in a replication payload.
pub fn post(id: &str, title: &str) -> Post {
    Post {
        id: PostId::from_string(id),
        title: title.to_string(),
        description: format!("{} description", title),
        user_id: UserId::from_string(USER_ID),
        date_created: test_date(),
        date_updated: test_date(),
    }
}

pub fn new_comment(post_id: &PostId, description: &str) -> NewComment {
    NewComment {
        description: description.to_string(),
        post_id: post_id.to_string(),
        user_id: USER_ID.to_string(),
    }
}
