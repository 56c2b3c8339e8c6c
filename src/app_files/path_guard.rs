//! 沙箱路径校验
//!
//! 将基础根目录与任意相对片段解析为规范路径（前导 `/`、正斜杠形式），
//! 拒绝任何会逃逸出根目录的输入。校验是纯函数，不会触碰存储。

use thiserror::Error;

/// 路径校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// 路径试图逃逸沙箱根目录
    #[error("path escapes the sandbox root: {0}")]
    Traversal(String),
    /// 片段中包含非法字符
    #[error("path contains an invalid segment: {0}")]
    InvalidSegment(String),
}

/// 规范化基础根目录
///
/// 结果总是以 `/` 开头，除根目录本身外不带尾随 `/`，
/// 其中的 `.` 与 `..` 会被折叠（`..` 在根目录处截止）。
pub fn normalize(base: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in base.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    join_under("/", &parts)
}

/// 将 `base` 与若干片段解析为规范路径
///
/// 片段之间共享同一个目录栈，因此 `resolve("/b", &["a", "../.."])` 会被拒绝。
/// 不会逃逸的内部 `..`（如 `sub/../file`）是允许的。
pub fn resolve<S: AsRef<str>>(base: &str, segments: &[S]) -> Result<String, PathError> {
    let root = normalize(base);
    let mut stack: Vec<&str> = Vec::new();

    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        check_segment(segment)?;

        for part in segment.split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    if stack.pop().is_none() {
                        return Err(PathError::Traversal(segment.to_string()));
                    }
                }
                other => stack.push(other),
            }
        }
    }

    Ok(join_under(&root, &stack))
}

/// 在解析前拒绝绝对路径、盘符路径、UNC 路径和 home 简写
fn check_segment(segment: &str) -> Result<(), PathError> {
    if segment.contains('\0') {
        return Err(PathError::InvalidSegment(segment.replace('\0', "\\0")));
    }
    if segment.starts_with('/') || segment.starts_with('\\') {
        return Err(PathError::Traversal(segment.to_string()));
    }
    if segment.starts_with('~') {
        return Err(PathError::Traversal(segment.to_string()));
    }
    let bytes = segment.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(PathError::Traversal(segment.to_string()));
    }
    Ok(())
}

fn join_under(root: &str, parts: &[&str]) -> String {
    if parts.is_empty() {
        return root.to_string();
    }
    let tail = parts.join("/");
    if root == "/" {
        format!("/{}", tail)
    } else {
        format!("{}/{}", root, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 判断 `path` 是否位于 `root` 之下（按路径组件边界，而非简单字符串前缀）
    fn is_within(root: &str, path: &str) -> bool {
        if root == "/" {
            return path.starts_with('/');
        }
        path == root
            || path
                .strip_prefix(root)
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
    }

    #[test]
    fn test_internal_parent_dir_is_allowed() {
        assert_eq!(resolve("/base", &["sub/../y"]).unwrap(), "/base/y");
        assert_eq!(resolve("/base", &["a", "b/../c"]).unwrap(), "/base/a/c");
    }

    #[test]
    fn test_empty_segments_are_noops() {
        assert_eq!(resolve("/base", &["", "x.txt", ""]).unwrap(), "/base/x.txt");
        assert_eq!(resolve::<&str>("/base", &[]).unwrap(), "/base");
    }

    #[test]
    fn test_rejects_escaping_inputs() {
        let cases = [
            "..",
            "../etc/passwd",
            "a/../../b",
            "/etc/passwd",
            "\\\\server\\share",
            "//server/share",
            "C:\\Windows",
            "c:relative",
            "~",
            "~/.ssh/id_rsa",
            "~root",
        ];
        for case in cases {
            assert!(
                matches!(resolve("/base", &[case]), Err(PathError::Traversal(_))),
                "expected traversal error for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_escape_across_segments() {
        assert!(resolve("/base", &["a", "../.."]).is_err());
        assert_eq!(resolve("/base", &["a", ".."]).unwrap(), "/base");
    }

    #[test]
    fn test_rejects_nul_byte() {
        assert!(matches!(
            resolve("/base", &["a\0b"]),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_backslashes_become_forward_slashes() {
        assert_eq!(resolve("/", &["src\\app\\main.rs"]).unwrap(), "/src/app/main.rs");
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("base/"), "/base");
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize("/../a"), "/a");
    }

    #[test]
    fn test_is_within_uses_component_boundary() {
        assert!(is_within("/base", "/base/x"));
        assert!(is_within("/base", "/base"));
        assert!(!is_within("/base", "/basement/x"));
        assert!(is_within("/", "/anything"));
    }

    proptest! {
        #[test]
        fn prop_safe_segments_stay_under_root(
            parts in proptest::collection::vec("[a-z0-9_]{1,8}", 1..6),
            base in "(/[a-z]{1,6}){0,3}",
        ) {
            let resolved = resolve(&base, &parts[..]).unwrap();
            let root = normalize(&base);
            prop_assert!(is_within(&root, &resolved));
            prop_assert!(resolved.split('/').all(|c| c != ".." && c != "."));
        }

        #[test]
        fn prop_leading_parent_dir_always_rejected(
            depth in 1usize..4,
            tail in "[a-z]{1,8}",
        ) {
            let input = format!("{}{}", "../".repeat(depth), tail);
            prop_assert!(matches!(resolve("/base", &[input]), Err(PathError::Traversal(_))));
        }
    }
}
