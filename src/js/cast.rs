//! Textual type coercions.
//!
//! Every sub-expression in the output dialect carries an explicit numeric
//! coercion (`|0`, `>>>0`, `+x`, `Math_fround(x)`, SIMD checks). This
//! module turns a text fragment plus its IR type and signedness/FFI intent
//! into the coerced form.

use crate::core::{CodegenOptions, CompileError, CompileResult};
use crate::ir::Type;
use std::ops::BitOr;

/// Signedness and FFI intent of a coercion.
///
/// `SIGNED` is the zero value; `UNSIGNED`/`NONSPECIFIC` select the integer
/// handling; `FFI_IN`/`FFI_OUT` restrict coercions to what foreign calls
/// accept; `MUST_CAST` forces a coercion even on constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cast(pub u16);

impl Cast {
    pub const SIGNED: Cast = Cast(0);
    pub const UNSIGNED: Cast = Cast(1);
    /// Do not differentiate ints: `|0` for all, regardless of size and sign.
    pub const NONSPECIFIC: Cast = Cast(2);
    /// FFI return values are limited to things that work in ffis.
    pub const FFI_IN: Cast = Cast(4);
    /// Params to FFIs are limited to things that work in ffis.
    pub const FFI_OUT: Cast = Cast(8);
    /// This value must be explicitly cast (or be an integer constant).
    pub const MUST_CAST: Cast = Cast(16);

    pub fn has(self, flag: Cast) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for Cast {
    type Output = Cast;
    fn bitor(self, rhs: Cast) -> Cast {
        Cast(self.0 | rhs.0)
    }
}

/// Coerce `s` to the canonical form for `ty`.
pub fn get_cast(
    s: &str,
    ty: &Type,
    cast: Cast,
    options: &CodegenOptions,
) -> CompileResult<String> {
    match ty {
        Type::Vector(elem, _) => Ok(if elem.is_integer() {
            format!("SIMD_int32x4_check({})", s)
        } else {
            format!("SIMD_float32x4_check({})", s)
        }),
        Type::Float if options.precise_f32 && !cast.has(Cast::FFI_OUT) => {
            Ok(if cast.has(Cast::FFI_IN) {
                format!("Math_fround(+({}))", s)
            } else {
                format!("Math_fround({})", s)
            })
        }
        Type::Float | Type::Double => Ok(format!("+{}", s)),
        Type::Int(width) => {
            // Narrow widths collapse to the 32-bit handling when the
            // coercion is nonspecific.
            if !cast.has(Cast::NONSPECIFIC) {
                match width {
                    1 => {
                        return Ok(if cast == Cast::UNSIGNED {
                            format!("{}&1", s)
                        } else {
                            format!("{}<<31>>31", s)
                        })
                    }
                    8 => {
                        return Ok(if cast == Cast::UNSIGNED {
                            format!("{}&255", s)
                        } else {
                            format!("{}<<24>>24", s)
                        })
                    }
                    16 => {
                        return Ok(if cast == Cast::UNSIGNED {
                            format!("{}&65535", s)
                        } else {
                            format!("{}<<16>>16", s)
                        })
                    }
                    32 => {}
                    _ => return Err(CompileError::UnlegalizedInteger { width: *width }),
                }
            } else if *width > 32 {
                return Err(CompileError::UnlegalizedInteger { width: *width });
            }
            Ok(if cast == Cast::SIGNED || cast.has(Cast::NONSPECIFIC) {
                format!("{}|0", s)
            } else {
                format!("{}>>>0", s)
            })
        }
        // Function values are pointers into the tables.
        Type::Ptr(_) | Type::Func(_) => Ok(if cast == Cast::SIGNED || cast.has(Cast::NONSPECIFIC) {
            format!("{}|0", s)
        } else {
            format!("{}>>>0", s)
        }),
        other => Err(CompileError::UnsupportedCast {
            ty: other.to_string(),
        }),
    }
}

/// Coerce `(s)` to the canonical form for `ty`.
pub fn get_paren_cast(
    s: &str,
    ty: &Type,
    cast: Cast,
    options: &CodegenOptions,
) -> CompileResult<String> {
    get_cast(&format!("({})", s), ty, cast, options)
}

/// Wrap in `Math_fround` when precise float32 semantics apply to `ty`.
pub fn ensure_float(s: String, ty: &Type, options: &CodegenOptions) -> String {
    if options.precise_f32 && ty.is_float() {
        format!("Math_fround({})", s)
    } else {
        s
    }
}

fn ensure_cast(s: &str, ty: &Type, cast: Cast, options: &CodegenOptions) -> CompileResult<String> {
    if cast.has(Cast::MUST_CAST) {
        get_cast(s, ty, Cast::SIGNED, options)
    } else {
        Ok(s.to_string())
    }
}

/// Spell a floating-point literal. Infinity and NaN use the runtime's own
/// spellings; integral values get a unary plus so downstream minification
/// cannot turn them back into int literals.
pub fn ftostr(
    value: f64,
    ty: &Type,
    cast: Cast,
    options: &CodegenOptions,
) -> CompileResult<String> {
    if value.is_infinite() {
        return ensure_cast(if value < 0.0 { "-inf" } else { "inf" }, ty, cast, options);
    }
    if value.is_nan() {
        return ensure_cast("nan", ty, cast, options);
    }

    let text = if ty.is_float() {
        format!("{}", value as f32)
    } else {
        format!("{}", value)
    };
    if value.fract() == 0.0 {
        Ok(format!("+{}", text))
    } else {
        Ok(text)
    }
}
