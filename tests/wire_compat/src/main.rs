fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use drivelfs_protocol::{
        ErrorCode, InitAck, Operation, Reply, Request, decode, encode,
    };
    use std::path::PathBuf;

    /// Lines exactly as the git-lfs client writes them.
    const INIT_LINE: &str = r#"{ "event": "init", "operation": "download", "remote": "origin", "concurrent": true, "concurrenttransfers": 3 }"#;
    const UPLOAD_LINE: &str = r#"{ "event": "upload", "oid": "bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a", "size": 73769, "path": "TestImg1.jpg", "action": { "href": "nfs://server/path", "header": { "key": "value" } } }"#;
    const DOWNLOAD_LINE: &str = r#"{ "event": "download", "oid": "bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a", "size": 73769, "action": { "href": "nfs://server/path", "header": { "key": "value" } } }"#;
    const TERMINATE_LINE: &str = r#"{ "event": "terminate" }"#;

    #[test]
    fn init_line_decodes() {
        let req = decode(INIT_LINE).unwrap();
        assert_eq!(
            req,
            Request::Init {
                operation: Operation::Download,
                remote: "origin".into(),
                concurrent: true,
                concurrent_transfers: 3,
            }
        );
    }

    #[test]
    fn upload_line_decodes() {
        let req = decode(UPLOAD_LINE).unwrap();
        match req {
            Request::Upload {
                oid,
                size,
                path,
                action,
            } => {
                assert_eq!(
                    oid,
                    "bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a"
                );
                assert_eq!(size, 73769);
                assert_eq!(path, PathBuf::from("TestImg1.jpg"));
                let action = action.unwrap();
                assert_eq!(action.href, "nfs://server/path");
                assert_eq!(action.header.get("key").unwrap(), "value");
            }
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn download_line_decodes() {
        let req = decode(DOWNLOAD_LINE).unwrap();
        match req {
            Request::Download { oid, size, action } => {
                assert_eq!(
                    oid,
                    "bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a"
                );
                assert_eq!(size, 73769);
                assert!(action.is_some());
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn terminate_line_decodes() {
        assert_eq!(decode(TERMINATE_LINE).unwrap(), Request::Terminate);
    }

    #[test]
    fn inbound_lines_roundtrip_through_serde() {
        for line in [INIT_LINE, UPLOAD_LINE, DOWNLOAD_LINE, TERMINATE_LINE] {
            let parsed = decode(line).unwrap();
            let reencoded = encode(&parsed).unwrap();
            let original: serde_json::Value = serde_json::from_str(line).unwrap();
            let ours: serde_json::Value = serde_json::from_str(&reencoded).unwrap();
            assert_eq!(original, ours, "roundtrip mismatch for {line}");
        }
    }

    #[test]
    fn init_ack_is_the_empty_object() {
        assert_eq!(encode(&InitAck::ok()).unwrap(), "{}");
    }

    #[test]
    fn progress_line_matches_the_documented_shape() {
        let reply = Reply::progress(
            "22ab5f63670800cc7be06dbed816012b0dc411e774754c7579467d2536a9cf3e",
            1234,
            64,
        );
        assert_eq!(
            encode(&reply).unwrap(),
            r#"{"event":"progress","oid":"22ab5f63670800cc7be06dbed816012b0dc411e774754c7579467d2536a9cf3e","bytesSoFar":1234,"bytesSinceLast":64}"#
        );
    }

    #[test]
    fn upload_complete_omits_path_and_error() {
        let reply = Reply::complete(
            "bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a",
        );
        assert_eq!(
            encode(&reply).unwrap(),
            r#"{"event":"complete","oid":"bf3e3e2af9366a3b704ae0c31de5afa64193ebabffde2091936ad2e7510bc03a"}"#
        );
    }

    #[test]
    fn download_complete_carries_the_path() {
        let reply = Reply::complete_with_path("abc", PathBuf::from("/path/to/file.png"));
        assert_eq!(
            encode(&reply).unwrap(),
            r#"{"event":"complete","oid":"abc","path":"/path/to/file.png"}"#
        );
    }

    #[test]
    fn failed_complete_carries_integer_code_and_message() {
        let reply = Reply::failed("abc", ErrorCode::FileNotFound, "object abc not found");
        assert_eq!(
            encode(&reply).unwrap(),
            r#"{"event":"complete","oid":"abc","error":{"code":2,"message":"object abc not found"}}"#
        );
    }
}
