//! Capability-selected rendering patches.
//!
//! Hosts without modern CSS support get a broad vector-fallback strategy
//! bound to the four widget classes that draw their own decorations; capable
//! hosts get a narrower patch on the progress indicator only. The two
//! branches are mutually exclusive and applied exactly once, at controller
//! construction.

use crate::error::Result;
use crate::runtime::GraphicsBackend;

/// Widget base classes eligible for a rendering patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Container,
    BasicText,
    GridRow,
    CompositeCell,
    ProgressIndicator,
}

/// Rendering strategy bundles the installer can bind to a widget class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMixin {
    /// Broad fallback used when the host cannot render CSS decorations.
    VectorFallback,
    /// Narrow patch for the progress indicator on CSS-capable hosts.
    NativeProgress,
}

/// Classes that receive [`RenderMixin::VectorFallback`], in attach order.
pub const FALLBACK_PATCH_TARGETS: [WidgetKind; 4] = [
    WidgetKind::Container,
    WidgetKind::BasicText,
    WidgetKind::GridRow,
    WidgetKind::CompositeCell,
];

/// External mechanism that binds a strategy to a widget class.
pub trait MixinInstaller: Send {
    fn attach(&mut self, widget: WidgetKind, mixin: RenderMixin) -> Result<()>;
}

/// Apply the capability-selected patch set. A no-op when the graphics
/// subsystem itself is unsupported.
pub fn apply_render_patches(
    graphics: &dyn GraphicsBackend,
    css_capable: bool,
    installer: &mut dyn MixinInstaller,
) -> Result<()> {
    if !graphics.is_supported() {
        return Ok(());
    }
    if css_capable {
        installer.attach(WidgetKind::ProgressIndicator, RenderMixin::NativeProgress)?;
    } else {
        for widget in FALLBACK_PATCH_TARGETS {
            installer.attach(widget, RenderMixin::VectorFallback)?;
        }
    }
    Ok(())
}
