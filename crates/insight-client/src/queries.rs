//! GraphQL documents sent to the content API.

/// Resolves the user behind the cookie tokens. `currentUser` is null when the
/// tokens are invalid.
pub(crate) const CURRENT_USER: &str = "
    query currentUser {
        currentUser {
            id
            username
            email
            profile {
                thumbnail
            }
        }
    }
";

/// One page of a user's posts, newest first. The cursor is the id of the last
/// post of the previous page.
pub(crate) const POSTS: &str = "
    query Posts($input: GetPostsInput) {
        posts(input: $input) {
            id
            title
            url_slug
            released_at
            likes
        }
    }
";

/// View and like counts of a single post.
pub(crate) const GET_STATS: &str = "
    query GetStats($post_id: ID!) {
        getStats(post_id: $post_id) {
            id
            likes
            views
        }
    }
";

pub(crate) const GET_STATS_OPERATION: &str = "GetStats";
