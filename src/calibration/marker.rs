// On-screen marker sizing for the capture view
//
// Markers (reference handles, POA cross, shot dots) keep a constant apparent
// size while the user pans and zooms the photo, so their size in image space
// shrinks as the zoom grows. Purely a rendering concern: nothing here feeds
// the physical transform.

/// Zoom levels below this are clamped to avoid oversized markers
pub const MIN_ZOOM_SCALE: f64 = 0.05;

/// Marker size in image pixels for the current zoom level
///
/// `display_size = base_size / zoom_scale`
pub fn marker_display_size(base_size: f64, zoom_scale: f64) -> f64 {
    let zoom = if zoom_scale.is_finite() {
        zoom_scale.max(MIN_ZOOM_SCALE)
    } else {
        1.0
    };
    base_size / zoom
}
