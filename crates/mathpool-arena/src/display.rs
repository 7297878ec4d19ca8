//! Human-readable rendering of handles and their values.

use std::fmt;

use mathpool_core::MathType;

use crate::context::MathContext;
use crate::handle::{MathId, MathLocation};

/// [`Display`](fmt::Display) adapter returned by
/// [`MathContext::display`].
///
/// Renders the element type, the lifetime class and the values:
///
/// ```text
/// [v4 (marked/1) : 1 2 3 4]
/// [mat (transient) : <0/2> 1 0 0 0 ... <1/2> ...]
/// [INVALID (8000000100000000)]
/// ```
pub struct ValueDisplay<'a> {
    ctx: &'a MathContext,
    id: MathId,
}

impl<'a> ValueDisplay<'a> {
    pub(crate) fn new(ctx: &'a MathContext, id: MathId) -> Self {
        Self { ctx, id }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ctx, id) = (self.ctx, self.id);
        if !ctx.valid(id) {
            return write!(f, "[INVALID ({:x})]", id.to_raw());
        }
        let ty = ctx.type_of(id);
        if ty == MathType::Null {
            return f.write_str("[null]");
        }
        write!(f, "[{} (", ty.name())?;
        match id.location() {
            MathLocation::Identity => f.write_str("identity")?,
            MathLocation::Constant { .. } => f.write_str("constant")?,
            MathLocation::Transient { .. } if id.is_ref() => f.write_str("ref")?,
            MathLocation::Transient { .. } => f.write_str("transient")?,
            MathLocation::Marked { slot } => {
                write!(f, "marked/{}", ctx.marked_count(slot))?
            }
            MathLocation::View { element, .. } => write!(f, "view <{element}>")?,
        }
        f.write_str(") :")?;

        let values = ctx.value(id);
        let size = ctx.size_of(id) as usize;
        let width = ty.floats_per_element();
        if size <= 1 {
            for v in values {
                write!(f, " {v}")?;
            }
        } else {
            for (i, chunk) in values.chunks(width).enumerate() {
                write!(f, " <{i}/{size}>")?;
                for v in chunk {
                    write!(f, " {v}")?;
                }
            }
        }
        f.write_str("]")
    }
}
