pub mod domain;
pub mod repository;
pub mod thread;

pub use domain::{Comment, CommentId, PostId, TOMBSTONE};
pub use repository::{CommentStore, DynCommentStore, SqliteCommentStore};
pub use thread::{organize, CommentForest, ThreadNode, ThreadView};
