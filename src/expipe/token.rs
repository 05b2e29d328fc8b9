//! Job tokens correlate one read → record lifecycle.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier and cancellation scope of a single read → record lifecycle.
///
/// The identifier is a fresh random 16-byte value and stays stable for the
/// lifetime of the token. The scope is derived from the parent scope, so
/// cancelling the parent cancels every outstanding job. A token is plain
/// data; nothing mutates it after construction.
#[derive(Debug, Clone)]
pub struct Token {
    id: Uuid,
    scope: CancellationToken,
}

impl Token {
    pub fn new(parent: &CancellationToken) -> Self {
        Token {
            id: Uuid::new_v4(),
            scope: parent.child_token(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The cancellation scope, for propagating into HTTP calls and child
    /// operations.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Completes when the scope is cancelled.
    pub async fn cancelled(&self) {
        self.scope.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }
}
