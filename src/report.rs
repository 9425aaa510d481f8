use crate::error::MirrorError;
use crate::models::FileNode;
use std::path::Path;

/// Name of the relocated-asset directory, excluded from reports: assets
/// are an implementation artifact, not navigable mirror content.
const ASSET_DIR_NAME: &str = "assets";

/// Walk the mirror root into a folder-structure tree for the caller.
/// Children are name-sorted so reports are deterministic.
pub fn describe(root: &Path) -> Result<FileNode, MirrorError> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    Ok(FileNode::Folder {
        name,
        children: walk(root, true)?,
    })
}

fn walk(dir: &Path, top_level: bool) -> Result<Vec<FileNode>, MirrorError> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut children = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            if top_level && name == ASSET_DIR_NAME {
                continue;
            }
            children.push(FileNode::Folder {
                children: walk(&entry.path(), false)?,
                name,
            });
        } else {
            children.push(FileNode::File { name });
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn reports_nested_tree_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("index.html"));
        touch(&dir.path().join("about.html"));
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        touch(&dir.path().join("docs/intro.html"));

        let tree = describe(dir.path()).unwrap();
        let FileNode::Folder { children, .. } = tree else {
            panic!("root must be a folder");
        };

        let names: Vec<_> = children.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["about.html", "docs", "index.html"]);

        let FileNode::Folder { children: docs, .. } = &children[1] else {
            panic!("docs must be a folder");
        };
        assert_eq!(docs, &vec![FileNode::File {
            name: "intro.html".to_string()
        }]);
    }

    #[test]
    fn skips_top_level_asset_dir_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("index.html"));
        std::fs::create_dir_all(dir.path().join("assets/js")).unwrap();
        touch(&dir.path().join("assets/img_1.jpg"));
        std::fs::create_dir_all(dir.path().join("docs/assets")).unwrap();

        let tree = describe(dir.path()).unwrap();
        let FileNode::Folder { children, .. } = tree else {
            panic!("root must be a folder");
        };

        assert!(children.iter().all(|c| c.name() != "assets"));

        let FileNode::Folder { children: docs, .. } = &children[0] else {
            panic!("docs must be a folder");
        };
        // Only the top-level assets dir is excluded by convention.
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name(), "assets");
    }

    #[test]
    fn empty_root_yields_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let tree = describe(dir.path()).unwrap();
        assert_eq!(
            tree,
            FileNode::Folder {
                name: dir.path().file_name().unwrap().to_string_lossy().into_owned(),
                children: vec![]
            }
        );
    }

    #[test]
    fn serializes_as_tagged_union() {
        let node = FileNode::Folder {
            name: "docs".to_string(),
            children: vec![FileNode::File {
                name: "intro.html".to_string(),
            }],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "folder");
        assert_eq!(json["children"][0]["type"], "file");
    }
}
