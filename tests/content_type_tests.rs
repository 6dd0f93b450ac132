use strata::content_type;

#[cfg(test)]
mod extension_tests {
    use super::*;

    #[test]
    fn test_html_types() {
        assert_eq!(content_type("index.html"), "text/html");
        assert_eq!(content_type("page.htm"), "text/html");
        assert_eq!(content_type("INDEX.HTML"), "text/html"); // case insensitive
    }

    #[test]
    fn test_stylesheet_and_script_types() {
        assert_eq!(content_type("style.css"), "text/css");
        assert_eq!(content_type("app.js"), "application/javascript");
        assert_eq!(content_type("data.json"), "application/json");
    }

    #[test]
    fn test_image_types() {
        assert_eq!(content_type("image.png"), "image/png");
        assert_eq!(content_type("photo.jpg"), "image/jpeg");
        assert_eq!(content_type("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type("anim.gif"), "image/gif");
    }

    #[test]
    fn test_plain_text_type() {
        assert_eq!(content_type("readme.txt"), "text/plain");
    }

    #[test]
    fn test_no_extension_falls_back_to_octet_stream() {
        assert_eq!(content_type("file"), "application/octet-stream");
        assert_eq!(content_type("Dockerfile"), "application/octet-stream");
    }

    #[test]
    fn test_unknown_extension_falls_back_to_octet_stream() {
        assert_eq!(content_type("archive.tar"), "application/octet-stream");
        assert_eq!(content_type("font.woff2"), "application/octet-stream");
        assert_eq!(content_type("data.xyz"), "application/octet-stream");
    }

    #[test]
    fn test_nested_paths_classify_by_final_extension() {
        assert_eq!(content_type("css/main.css"), "text/css");
        assert_eq!(content_type("images/logo.png"), "image/png");
        assert_eq!(content_type("js/modules/app.js"), "application/javascript");
    }
}
