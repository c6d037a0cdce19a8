pub mod generator;
pub mod models;
pub mod parser;
pub mod walker;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    use crate::generator::Generator;
    use crate::models::CaseSpec;
    use crate::parser::GoParser;
    use crate::walker::Corpus;

    fn write_login_handler(dir: &std::path::Path) {
        let mut file = File::create(dir.join("auth.go")).unwrap();
        write!(
            file,
            r#"
package api

type LoginRequest struct {{
    Email    string `json:"email"`
    Password string `json:"password"`
}}

func (s *Server) handleLogin(c *gin.Context) {{
    var req LoginRequest
    if err := c.ShouldBindJSON(&req); err != nil {{
        c.JSON(http.StatusBadRequest, gin.H{{"error": err.Error()}})
        return
    }}
    c.JSON(http.StatusOK, gin.H{{"token": token}})
}}
"#
        )
        .unwrap();
    }

    #[test]
    fn test_generate_login_case_without_route() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_login_handler(src.path());

        let parser = GoParser::new(Corpus::new(src.path(), "go"));
        let paths = Generator::new("handleLogin", "case01")
            .with_test_root(out.path())
            .generate(&parser, None, None)
            .unwrap();

        assert!(paths.case_dir.join("PrepareData").is_dir());
        assert!(paths.case_dir.join("CheckData").is_dir());
        assert_eq!(paths.test_file, out.path().join("handleLogin/handleLogin_test.go"));
        assert!(paths.test_file.is_file());

        let case: CaseSpec =
            serde_yaml::from_str(&fs::read_to_string(&paths.case_file).unwrap()).unwrap();
        assert_eq!(case.name, "handleLogin case01");
        assert_eq!(case.request.method, "POST");
        assert_eq!(case.request.path, "/api/handleLogin");
        assert_eq!(
            case.request.body.keys().collect::<Vec<_>>(),
            vec!["email", "password"]
        );
        assert!(case.request.body.values().all(|v| v == ""));
        // First gin.H literal in the body is the error response.
        assert_eq!(case.expect.body.keys().collect::<Vec<_>>(), vec!["error"]);
        assert_eq!(case.expect.status, 200);
    }

    #[test]
    fn test_generate_uses_registered_route() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_login_handler(src.path());
        fs::write(
            src.path().join("routes.go"),
            concat!(
                "package api\n\n",
                "func (s *Server) routes(api *gin.RouterGroup) {\n",
                "\tapi.POST(\"/v1/login\",\n\t\ts.handleLogin)\n",
                "}\n",
            ),
        )
        .unwrap();

        let parser = GoParser::new(Corpus::new(src.path(), "go"));
        let paths = Generator::new("handleLogin", "case01")
            .with_test_root(out.path())
            .generate(&parser, None, None)
            .unwrap();

        let case: CaseSpec =
            serde_yaml::from_str(&fs::read_to_string(&paths.case_file).unwrap()).unwrap();
        assert_eq!(case.request.path, "/v1/login");
    }

    #[test]
    fn test_generate_request_override_from_file() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_login_handler(src.path());
        let req_file = out.path().join("req.yml");
        fs::write(
            &req_file,
            "method: PUT\nheaders:\n  Authorization: Bearer x\nbody:\n  email: a@b.c\n",
        )
        .unwrap();

        let parser = GoParser::new(Corpus::new(src.path(), "go"));
        let paths = Generator::new("handleLogin", "override")
            .with_test_root(out.path())
            .generate(
                &parser,
                Some(&format!("@{}", req_file.display())),
                Some(r#"{"status": 201}"#),
            )
            .unwrap();

        let case: CaseSpec =
            serde_yaml::from_str(&fs::read_to_string(&paths.case_file).unwrap()).unwrap();
        assert_eq!(case.request.method, "PUT");
        assert_eq!(case.request.headers["Authorization"], "Bearer x");
        assert_eq!(case.request.body.len(), 1);
        assert_eq!(case.request.body["email"], "a@b.c");
        assert_eq!(case.expect.status, 201);
        assert_eq!(case.expect.body.keys().collect::<Vec<_>>(), vec!["error"]);
    }

    #[test]
    fn test_generate_is_idempotent() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_login_handler(src.path());

        let parser = GoParser::new(Corpus::new(src.path(), "go"));
        let generator = Generator::new("handleLogin", "case01").with_test_root(out.path());

        let first = generator.generate(&parser, None, None).unwrap();
        let first_yaml = fs::read_to_string(&first.case_file).unwrap();
        let second = generator.generate(&parser, None, None).unwrap();
        let second_yaml = fs::read_to_string(&second.case_file).unwrap();

        assert_eq!(first_yaml, second_yaml);
    }

    #[test]
    fn test_generate_unknown_handler_falls_back_to_defaults() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_login_handler(src.path());

        let parser = GoParser::new(Corpus::new(src.path(), "go"));
        let paths = Generator::new("handleMissing", "case01")
            .with_test_root(out.path())
            .generate(&parser, None, None)
            .unwrap();

        let case: CaseSpec =
            serde_yaml::from_str(&fs::read_to_string(&paths.case_file).unwrap()).unwrap();
        assert_eq!(case.request.path, "/api/handleMissing");
        assert!(case.request.body.is_empty());
        assert!(case.expect.body.is_empty());
    }
}
