//! Content domain: relational entities, document shapes and the activity vocabulary
//! shared with sibling services.

pub mod activity;
pub mod comment;
pub mod dead_letter;
pub mod document;
pub mod member;
pub mod post;
pub mod request;
pub mod view;

pub use activity::{ActivityCategory, ActivityRequest, MemberActivityType};
pub use comment::{Comment, NewComment};
pub use dead_letter::{DeadLetter, DeadLetterChannel};
pub use document::{CommentDocument, CommentLikeDocument, PostDocument, PostLikeDocument};
pub use member::{Member, MemberSummary};
pub use post::{NewPost, Post};
pub use request::{
    CreateCommentRequest, CreatePostRequest, UpdateCommentRequest, UpdatePostRequest,
};
pub use view::{
    CommentSummary, CommentView, PostItemCounts, PostView, ResponseResult, ServerResponse,
};
