//! Port definition for display surfaces.

use std::sync::Arc;

use crate::domain::entities::TaskHandle;

/// A mutable display slot that shows a placeholder until a decoded image is
/// installed.
///
/// A surface holds at most one live task binding at a time; rebinding
/// revokes the previous task's right to mutate the surface even if that task
/// is still running. The coordinator only ever calls [`show_image`] after
/// re-checking that the surface is still bound to the completing task.
///
/// Implementations must be thread-safe; the crate never extends a surface's
/// lifetime (it is held only through [`std::sync::Weak`]).
///
/// [`show_image`]: DisplaySurface::show_image
#[cfg_attr(test, mockall::automock)]
pub trait DisplaySurface: Send + Sync {
    /// Returns the task currently bound to this surface, if any.
    fn bound_task(&self) -> Option<TaskHandle>;

    /// Binds a task (or clears the binding with `None`), replacing any
    /// prior binding.
    fn bind_task(&self, task: Option<TaskHandle>);

    /// Shows the placeholder image.
    fn show_placeholder(&self);

    /// Installs a decoded image.
    fn show_image(&self, image: Arc<image::DynamicImage>);
}
