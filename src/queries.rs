//! The SQL texts the application issues
//!
//! Every statement here runs unchanged against the remote MySQL clusters and
//! is recognised by the local [`Interpreter`](crate::interpreter::Interpreter)
//! when the remote path is down. Parameters are positional (`?`).

/// Feed page: posts with author, like/comment counts and the viewer's like.
/// Params: viewer id, limit, offset.
pub const FEED: &str = "SELECT p.*, pr.username, pr.display_name, pr.photo_url, \
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count, \
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count, \
    EXISTS (SELECT 1 FROM likes l2 WHERE l2.post_id = p.id AND l2.user_id = ?) AS is_liked \
    FROM posts p JOIN profiles pr ON pr.id = p.user_id \
    ORDER BY p.created_at DESC LIMIT ? OFFSET ?";

/// Feed restricted to one domain. Params: viewer id, domain, limit, offset.
pub const FEED_BY_DOMAIN: &str = "SELECT p.*, pr.username, pr.display_name, pr.photo_url, \
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count, \
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count, \
    EXISTS (SELECT 1 FROM likes l2 WHERE l2.post_id = p.id AND l2.user_id = ?) AS is_liked \
    FROM posts p JOIN profiles pr ON pr.id = p.user_id \
    WHERE p.domain = ? \
    ORDER BY p.created_at DESC LIMIT ? OFFSET ?";

/// Params: viewer id, author id.
pub const POSTS_BY_USER: &str = "SELECT p.*, pr.username, pr.display_name, pr.photo_url, \
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count, \
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count, \
    EXISTS (SELECT 1 FROM likes l2 WHERE l2.post_id = p.id AND l2.user_id = ?) AS is_liked \
    FROM posts p JOIN profiles pr ON pr.id = p.user_id \
    WHERE p.user_id = ? \
    ORDER BY p.created_at DESC";

pub const POST_BY_ID: &str = "SELECT * FROM posts WHERE id = ? LIMIT 1";

/// Params: post id.
pub const COMMENTS_FOR_POST: &str = "SELECT c.*, pr.username, pr.photo_url \
    FROM comments c JOIN profiles pr ON pr.id = c.user_id \
    WHERE c.post_id = ? \
    ORDER BY c.created_at ASC";

pub const PROFILE_BY_ID: &str = "SELECT * FROM profiles WHERE id = ?";

pub const PROFILE_BY_USERNAME: &str = "SELECT * FROM profiles WHERE username = ? LIMIT 1";

/// Params: a LIKE pattern such as `%bo%`.
pub const SEARCH_PROFILES: &str = "SELECT id, username, display_name, photo_url \
    FROM profiles WHERE username LIKE ? ORDER BY username LIMIT 20";

/// Profiles following a user. Params: followed user id.
pub const FOLLOWERS: &str = "SELECT pr.id, pr.username, pr.display_name, pr.photo_url \
    FROM follows f JOIN profiles pr ON pr.id = f.follower_id \
    WHERE f.following_id = ? \
    ORDER BY f.created_at DESC";

/// Profiles a user follows. Params: follower id.
pub const FOLLOWING: &str = "SELECT pr.id, pr.username, pr.display_name, pr.photo_url \
    FROM follows f JOIN profiles pr ON pr.id = f.following_id \
    WHERE f.follower_id = ? \
    ORDER BY f.created_at DESC";

/// Params: follower id, followed id.
pub const IS_FOLLOWING: &str = "SELECT 1 AS is_following FROM follows \
    WHERE follower_id = ? AND following_id = ? LIMIT 1";

pub const COUNT_LIKES: &str = "SELECT COUNT(*) AS count FROM likes WHERE post_id = ?";

pub const COUNT_FOLLOWERS: &str = "SELECT COUNT(*) AS count FROM follows WHERE following_id = ?";

pub const INSERT_POST: &str = "INSERT INTO posts (id, user_id, domain, content, image_url, created_at) \
    VALUES (?, ?, ?, ?, ?, ?)";

pub const INSERT_COMMENT: &str = "INSERT INTO comments (id, post_id, user_id, content, created_at) \
    VALUES (?, ?, ?, ?, ?)";

pub const INSERT_LIKE: &str = "INSERT IGNORE INTO likes (id, post_id, user_id, created_at) \
    VALUES (?, ?, ?, ?)";

/// Params: post id, user id.
pub const DELETE_LIKE: &str = "DELETE FROM likes WHERE post_id = ? AND user_id = ?";

pub const FOLLOW: &str = "INSERT IGNORE INTO follows (follower_id, following_id, created_at) \
    VALUES (?, ?, NOW())";

/// Params: follower id, followed id.
pub const UNFOLLOW: &str = "DELETE FROM follows WHERE follower_id = ? AND following_id = ?";

pub const UPSERT_PROFILE: &str = "INSERT INTO profiles (id, username, display_name, photo_url, created_at) \
    VALUES (?, ?, ?, ?, NOW()) \
    ON DUPLICATE KEY UPDATE display_name = VALUES(display_name), photo_url = VALUES(photo_url)";

/// Params: display name, bio, photo url, profile id.
pub const UPDATE_PROFILE: &str = "UPDATE profiles SET display_name = ?, bio = ?, photo_url = ? WHERE id = ?";

/// Params: content, post id.
pub const UPDATE_POST: &str = "UPDATE posts SET content = ?, updated_at = NOW() WHERE id = ?";

pub const DELETE_POST: &str = "DELETE FROM posts WHERE id = ?";

/// Cascade before [`DELETE_POST`]. Params: post id.
pub const DELETE_POST_COMMENTS: &str = "DELETE FROM comments WHERE post_id = ?";

/// Cascade before [`DELETE_POST`]. Params: post id.
pub const DELETE_POST_LIKES: &str = "DELETE FROM likes WHERE post_id = ?";

pub const DELETE_COMMENT: &str = "DELETE FROM comments WHERE id = ?";

/// Every catalogue statement with its name
pub const ALL: &[(&str, &str)] = &[
    ("FEED", FEED),
    ("FEED_BY_DOMAIN", FEED_BY_DOMAIN),
    ("POSTS_BY_USER", POSTS_BY_USER),
    ("POST_BY_ID", POST_BY_ID),
    ("COMMENTS_FOR_POST", COMMENTS_FOR_POST),
    ("PROFILE_BY_ID", PROFILE_BY_ID),
    ("PROFILE_BY_USERNAME", PROFILE_BY_USERNAME),
    ("SEARCH_PROFILES", SEARCH_PROFILES),
    ("FOLLOWERS", FOLLOWERS),
    ("FOLLOWING", FOLLOWING),
    ("IS_FOLLOWING", IS_FOLLOWING),
    ("COUNT_LIKES", COUNT_LIKES),
    ("COUNT_FOLLOWERS", COUNT_FOLLOWERS),
    ("INSERT_POST", INSERT_POST),
    ("INSERT_COMMENT", INSERT_COMMENT),
    ("INSERT_LIKE", INSERT_LIKE),
    ("DELETE_LIKE", DELETE_LIKE),
    ("FOLLOW", FOLLOW),
    ("UNFOLLOW", UNFOLLOW),
    ("UPSERT_PROFILE", UPSERT_PROFILE),
    ("UPDATE_PROFILE", UPDATE_PROFILE),
    ("UPDATE_POST", UPDATE_POST),
    ("DELETE_POST", DELETE_POST),
    ("DELETE_POST_COMMENTS", DELETE_POST_COMMENTS),
    ("DELETE_POST_LIKES", DELETE_POST_LIKES),
    ("DELETE_COMMENT", DELETE_COMMENT),
];
