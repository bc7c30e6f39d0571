//! The compensating-creation primitive.
//!
//! There is no atomic transaction spanning the primary store and the
//! sharing registry; multi-step creation uses best-effort compensation
//! instead: if the post-create step fails, the compensating delete is
//! attempted synchronously before the original error is returned. A
//! failed compensation is logged and the original error still surfaces.

use std::future::Future;

use tracing::error;

/// Run `create`, then `post_create`; on post-create failure run
/// `compensate` and return the original post-create error.
pub async fn create_with_compensation<T, E, C, CFut, P, PFut, R, RFut>(
    create: C,
    post_create: P,
    compensate: R,
) -> Result<T, E>
where
    T: Clone,
    E: std::fmt::Display,
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<T, E>>,
    P: FnOnce(T) -> PFut,
    PFut: Future<Output = Result<(), E>>,
    R: FnOnce(T) -> RFut,
    RFut: Future<Output = Result<(), E>>,
{
    let created = create().await?;
    if let Err(post_error) = post_create(created.clone()).await {
        if let Err(rollback_error) = compensate(created).await {
            error!(
                "Compensating delete failed after post-create error: {}",
                rollback_error
            );
        }
        return Err(post_error);
    }
    Ok(created)
}
