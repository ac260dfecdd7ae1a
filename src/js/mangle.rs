//! Symbol name mangling.
//!
//! IR symbols map into two disjoint textual namespaces: globals are
//! prefixed `_`, locals `$`, so neither can collide with runtime names or
//! with each other. Illegal bytes are rewritten deterministically; the
//! same input always produces the same output.

fn is_valid(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn half_to_hex(half: u8) -> u8 {
    debug_assert!(half <= 15);
    if half <= 9 {
        b'0' + half
    } else {
        b'A' + half - 10
    }
}

/// Mangle a global symbol name: prefix `_`, lower every other illegal byte
/// to `_`. Globals arrive in C-style format, so collisions from the lossy
/// rewrite do not happen in practice.
pub fn sanitize_global(name: &str) -> String {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.push(b'_');
    bytes.extend_from_slice(name.as_bytes());
    for byte in bytes.iter_mut().skip(1) {
        if !is_valid(*byte) {
            *byte = b'_';
        }
    }
    String::from_utf8(bytes).expect("sanitized global is ASCII-clean")
}

/// Mangle a local name: prefix `$`, keep valid bytes, and rewrite illegal
/// bytes without collisions. Every illegal byte becomes `$` in place; a `.`
/// queues a `Z` glyph, any other illegal byte flushes the queued `Z`s and
/// its two uppercase hex digits at the end of the name. `.` alone appends
/// nothing, so the common `x.a` stays short (`$x$a`), while `x.,a` becomes
/// `$x$$aZ2C`.
pub fn sanitize_local(name: &str) -> String {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.push(b'$');
    bytes.extend_from_slice(name.as_bytes());

    let original_len = bytes.len();
    let mut queued = 0usize;
    for i in 1..original_len {
        let c = bytes[i];
        if !is_valid(c) {
            bytes[i] = b'$';
            if c == b'.' {
                queued += 1;
            } else {
                for _ in 0..queued {
                    bytes.push(b'Z');
                }
                queued = 0;
                bytes.push(half_to_hex(c >> 4));
                bytes.push(half_to_hex(c & 0xf));
            }
        }
    }
    String::from_utf8(bytes).expect("sanitized local is ASCII-clean")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_prefix_and_rewrite() {
        assert_eq!(sanitize_global("main"), "_main");
        assert_eq!(sanitize_global("llvm.memcpy.p0i8.p0i8.i32"), "_llvm_memcpy_p0i8_p0i8_i32");
        assert_eq!(sanitize_global("a-b"), "_a_b");
    }

    #[test]
    fn test_global_sanitize_is_stable_on_own_output() {
        for name in ["main", "a.b", "x-y.z", "_already"] {
            let once = sanitize_global(name);
            let twice = sanitize_global(&once);
            assert_eq!(twice, format!("_{}", once));
        }
    }

    #[test]
    fn test_local_dot_shorthand() {
        assert_eq!(sanitize_local("x"), "$x");
        assert_eq!(sanitize_local("x.a"), "$x$a");
        assert_eq!(sanitize_local("x..a"), "$x$$a");
    }

    #[test]
    fn test_local_hex_escape_flushes_queued_dots() {
        // ',' is 0x2C; the dot before it queues one Z.
        assert_eq!(sanitize_local("x.,a"), "$x$$aZ2C");
        assert_eq!(sanitize_local("x,a"), "$x$a2C");
    }

    #[test]
    fn test_local_injective_on_corpus() {
        let corpus = [
            "x.a", "x_a", "x,a", "x a", "xa", "x.a.b", "x..ab", "a", "a.", "a,", "0", "0.",
        ];
        let mut seen = std::collections::HashSet::new();
        for name in corpus {
            assert!(seen.insert(sanitize_local(name)), "collision for {:?}", name);
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(sanitize_local("weird name.0"), sanitize_local("weird name.0"));
    }
}
