//! 从生成的代码文本中派生文件清单

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app_files::canonical_file_path;

/// 清单中的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub path: String,
    pub language: String,
}

/// `// File: path`、`# File: path`、`<!-- File: path -->`
static FILE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?://|#|<!--)\s*[Ff]ile:\s*([^\s>]+)").expect("valid file marker regex")
});

/// ```` ```tsx src/App.tsx ````
static FENCE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^```[\w+-]*[ \t]+([\w./\\-]+\.\w+)[ \t]*$").expect("valid fence regex")
});

/// 按出现顺序收集文本中声明的文件路径
///
/// 路径经过沙箱校验，逃逸的路径会被丢弃；重复路径只保留第一次出现。
pub fn derive_file_manifest(code: &str) -> Vec<GeneratedFile> {
    let mut found: Vec<(usize, &str)> = FILE_MARKER
        .captures_iter(code)
        .chain(FENCE_PATH.captures_iter(code))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    found.sort_by_key(|(offset, _)| *offset);

    let mut files: Vec<GeneratedFile> = Vec::new();
    for (_, raw) in found {
        let path = match canonical_file_path(raw) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!("[Manifest] 丢弃无效路径 {:?}: {}", raw, e);
                continue;
            }
        };
        if files.iter().any(|f| f.path == path) {
            continue;
        }
        files.push(GeneratedFile {
            language: detect_language(&path),
            path,
        });
    }
    files
}

/// 根据文件扩展名推断语言
pub fn detect_language(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    };

    match ext.as_str() {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "html" | "htm" => "html",
        "css" => "css",
        "json" => "json",
        "md" => "markdown",
        "rs" => "rust",
        "py" => "python",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        _ => "plaintext",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_markers() {
        let code = "// File: src/App.tsx\nexport default 1;\n# file: scripts/build.py\n<!-- File: index.html -->\n";
        let files = derive_file_manifest(code);
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/src/App.tsx", "/scripts/build.py", "/index.html"]);
        assert_eq!(files[0].language, "tsx");
        assert_eq!(files[2].language, "html");
    }

    #[test]
    fn test_fenced_blocks_and_order() {
        let code = "```css styles/main.css\nbody {}\n```\n// File: src/main.js\n```js src/main.js\n```";
        let files = derive_file_manifest(code);
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/styles/main.css", "/src/main.js"]);
    }

    #[test]
    fn test_escaping_paths_are_dropped() {
        let code = "// File: ../../etc/passwd\n// File: ~/secret.txt\n// File: ok.txt\n";
        let files = derive_file_manifest(code);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/ok.txt");
    }

    #[test]
    fn test_no_markers() {
        assert!(derive_file_manifest("fn main() {}").is_empty());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("/a/b.TS"), "typescript");
        assert_eq!(detect_language("/Makefile"), "plaintext");
        assert_eq!(detect_language("/.env"), "plaintext");
    }
}
