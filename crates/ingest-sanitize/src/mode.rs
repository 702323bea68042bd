/// Governs how [`crate::Sanitize::sanitize`] treats an item that violates a
/// declared field limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SanitationMode {
    /// Perform no repair; the item is passed through unmodified. Use
    /// [`crate::Sanitize::verify`] separately if the caller still wants to
    /// reject violating items.
    None,
    /// Repair fields in place: truncate strings to their byte limit, trim
    /// metadata maps down to their key/size budget, and (for data points
    /// only) replace non-finite numeric values with `non_finite_replacement`
    /// when one is configured.
    Clean { non_finite_replacement: Option<f64> },
    /// Drop items that violate any declared limit instead of repairing
    /// them. Non-finite data point values are always dropped in this mode,
    /// regardless of any replacement configured elsewhere in the pipeline —
    /// `Remove` carries no replacement value to apply.
    Remove,
}
