/// Remote tracking service that owns actions.
///
/// `complete_action` is fire-and-forget: the lifecycle issues the call and
/// moves on. Acknowledgment and retries are the provider's concern.
pub trait TrackingProvider: Send + Sync {
    fn complete_action(&self, action_id: &str);
}
