use insta::assert_snapshot;
use sandtree::domain::model::{Directory, Tree};

fn vite_tree() -> Tree {
    Tree::from_root(
        Directory::new()
            .with_file("index.html", "<div id=\"root\"></div>")
            .with_dir(
                "src",
                Directory::new().with_file("main.jsx", "import App from './App'\n"),
            ),
    )
}

#[test]
fn persisted_tree_format() {
    let rendered = serde_json::to_string_pretty(&vite_tree()).unwrap();
    assert_snapshot!(rendered, @r#"
    {
      "index.html": {
        "file": {
          "contents": "<div id=\"root\"></div>"
        }
      },
      "src": {
        "directory": {
          "main.jsx": {
            "file": {
              "contents": "import App from './App'\n"
            }
          }
        }
      }
    }
    "#);
}

#[test]
fn persisted_tree_round_trips_without_nul() {
    let tree = Tree::from_root(Directory::new().with_file("blob.txt", "a\u{0}b"));
    let json = tree.to_json().unwrap();
    assert!(!json.contains("\\u0000"));

    let decoded = Tree::from_json(&json).unwrap();
    let expected = Tree::from_root(Directory::new().with_file("blob.txt", "ab"));
    assert_eq!(decoded, expected);
}
