//! Helpers over canonical type strings.
//!
//! Types are carried as text (`int`, `[T]`, `(A, B)`, `Name`, `Name<T>`) and
//! compared bytewise, with `any` as a wildcard sentinel used by the standard
//! library signatures.

/// The wildcard type that matches anything.
pub const ANY: &str = "any";

/// The type of statements and of functions without a return annotation.
pub const NULL: &str = "null";

/// Primitive values are exempt from move tracking.
pub fn is_primitive(ty: &str) -> bool {
    matches!(ty, "int" | "str" | "bool" | "null")
}

pub fn is_list(ty: &str) -> bool {
    ty.starts_with('[') && ty.ends_with(']')
}

/// `[T]` -> `T`
pub fn list_elem(ty: &str) -> Option<&str> {
    if is_list(ty) {
        Some(&ty[1..ty.len() - 1])
    } else {
        None
    }
}

pub fn is_tuple(ty: &str) -> bool {
    ty.starts_with('(') && ty.ends_with(')')
}

/// `(A, B)` -> `[A, B]`
pub fn tuple_elems(ty: &str) -> Option<Vec<&str>> {
    if is_tuple(ty) {
        Some(split_top(&ty[1..ty.len() - 1]))
    } else {
        None
    }
}

/// The nominal base of a type: `Box<str>` -> `Box`, `Box` -> `Box`.
pub fn base_name(ty: &str) -> &str {
    match ty.find('<') {
        Some(i) => &ty[..i],
        None => ty,
    }
}

/// The generic arguments, extracted as the text between the outermost angle
/// brackets: `Result<int, str>` -> `[int, str]`.
pub fn generic_args(ty: &str) -> Option<Vec<&str>> {
    let open = ty.find('<')?;
    if !ty.ends_with('>') {
        return None;
    }
    Some(split_top(&ty[open + 1..ty.len() - 1]))
}

/// Split on top-level commas, ignoring commas nested in `<>`, `[]`, `()`.
fn split_top(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

/// Loose equality over canonical type strings.
///
/// `any` matches everything; lists and tuples match element-wise; a bare
/// nominal name matches any instantiation of the same base (runtime struct
/// values carry only the erased base name).
pub fn matches(a: &str, b: &str) -> bool {
    if a == b || a == ANY || b == ANY {
        return true;
    }
    if let (Some(ea), Some(eb)) = (list_elem(a), list_elem(b)) {
        return matches(ea, eb);
    }
    if let (Some(ta), Some(tb)) = (tuple_elems(a), tuple_elems(b)) {
        return ta.len() == tb.len() && ta.iter().zip(&tb).all(|(x, y)| matches(x, y));
    }
    if base_name(a) == base_name(b) && !base_name(a).is_empty() {
        let ga = generic_args(a);
        let gb = generic_args(b);
        return match (ga, gb) {
            (Some(xs), Some(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(&ys).all(|(x, y)| matches(x, y))
            }
            // `Box` against `Box<str>`: accepted, the argument is erased
            _ => true,
        };
    }
    false
}

/// Pick the more specific of two matching types (`any` defers to the other).
pub fn resolve<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a == ANY {
        b
    } else {
        a
    }
}
