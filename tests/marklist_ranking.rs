use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response for {}: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn spawn(workspace: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .env("RESULTSD_WORKSPACE", workspace)
        .env_remove("RESULTSD_SUBJECTS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn seed_grade1_midterm(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Vec<String> {
    let rows = [
        ("Amina", json!({ "maths": 90, "english": 90, "kiswahili": 90, "integrated": 90 })),
        ("Brian", json!({ "maths": 75, "english": 75, "kiswahili": 75, "integrated": 75 })),
        ("Cynthia", json!({ "maths": 70, "english": 80, "kiswahili": 75, "integrated": 75 })),
        ("Dan", json!({ "maths": 50 })),
    ];
    let mut ids = Vec::new();
    for (i, (name, scores)) in rows.iter().enumerate() {
        let res = request_ok(
            stdin,
            reader,
            &format!("seed-{i}"),
            "results.create",
            json!({ "name": name, "class": "Grade 1", "examType": "midterm", "scores": scores }),
        );
        ids.push(res["result"]["id"].as_str().expect("id").to_string());
    }
    // Another sitting in the same class must not leak into the midterm list.
    request_ok(
        stdin,
        reader,
        "seed-other",
        "results.create",
        json!({
            "name": "Amina",
            "class": "Grade 1",
            "examType": "opener",
            "scores": { "maths": 10, "english": 10, "kiswahili": 10, "integrated": 10 }
        }),
    );
    ids
}

#[test]
fn marklist_ranks_descending_with_ties_in_entry_order_and_unranked_last() {
    let workspace = temp_dir("resultsd-marklist");
    let (mut child, mut stdin, mut reader) = spawn(&workspace);

    // RESULTSD_WORKSPACE opens the workspace at startup.
    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    let expected = workspace.to_string_lossy().to_string();
    assert_eq!(health["workspacePath"].as_str(), Some(expected.as_str()));

    let ids = seed_grade1_midterm(&mut stdin, &mut reader);

    let ml = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.marklist",
        json!({ "class": "Grade 1", "examType": "midterm" }),
    );
    let rows = ml["rows"].as_array().expect("rows");
    let summary: Vec<(serde_json::Value, &str)> = rows
        .iter()
        .map(|r| (r["position"].clone(), r["name"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (json!(1), "Amina"),
            (json!(2), "Brian"),
            (json!(3), "Cynthia"),
            (json!("unranked"), "Dan"),
        ]
    );
    assert_eq!(rows[3]["id"].as_str(), Some(ids[3].as_str()));
    assert!(rows[3]["mean"].is_null());
    assert_eq!(rows[3]["scores"], json!([50.0, null, null, null]));
    assert_eq!(rows[0]["rubric"], "Exceeds Expectations (E.E)");
    assert_eq!(ml["classAverage"], 80.0);
    assert_eq!(ml["examType"], "midterm");
    let codes: Vec<&str> = ml["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .filter_map(|s| s["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["maths", "english", "kiswahili", "integrated"]);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.student",
        json!({ "id": ids[2] }),
    );
    assert_eq!(report["position"], 3);
    assert_eq!(report["groupSize"], 4);
    assert_eq!(report["mean"], 75.0);
    assert_eq!(report["rubric"], "Meets Expectations (M.E)");
    assert_eq!(report["classAverage"], 80.0);
    let maths = &report["subjects"][0];
    assert_eq!(maths["code"], "maths");
    assert_eq!(maths["rubric"], "Meets Expectations (M.E)");
    assert_eq!(maths["remark"], "Outstanding");

    let unranked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.student",
        json!({ "id": ids[3] }),
    );
    assert_eq!(unranked["position"], "unranked");
    assert!(unranked["overallRemark"].is_null());
    assert_eq!(unranked["subjects"][0]["remark"], "Needs improved study habits");
    assert!(unranked["subjects"][1]["remark"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn csv_export_follows_report_settings() {
    let workspace = temp_dir("resultsd-marklist-csv");
    let out = workspace.join("exports").join("grade1-midterm.csv");
    let (mut child, mut stdin, mut reader) = spawn(&workspace);
    seed_grade1_midterm(&mut stdin, &mut reader);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.exportMarklistCsv",
        json!({ "class": "Grade 1", "examType": "midterm", "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], 4);
    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Position,Name,Maths,English,Kiswahili,Integrated,Mean,Rubric"
    );
    assert_eq!(
        lines[1],
        "1,Amina,90,90,90,90,90.00,Exceeds Expectations (E.E)"
    );
    assert_eq!(lines[4], "-,Dan,50,-,-,-,-,-");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "reports", "patch": { "meanDecimals": 1, "placeholder": "N/A" } }),
    );
    assert_eq!(updated["settings"]["meanDecimals"], 1);

    let settings = request_ok(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(settings["reports"]["placeholder"], "N/A");

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.exportMarklistCsv",
        json!({ "class": "Grade 1", "examType": "midterm", "outPath": out.to_string_lossy() }),
    );
    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[2], "2,Brian,75,75,75,75,75.0,Meets Expectations (M.E)");
    assert_eq!(lines[4], "N/A,Dan,50,N/A,N/A,N/A,N/A,N/A");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn overall_report_weights_the_three_sittings() {
    let workspace = temp_dir("resultsd-overall");
    let (mut child, mut stdin, mut reader) = spawn(&workspace);

    for (i, (exam, mark)) in [("opener", 80), ("midterm", 90)].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "results.create",
            json!({
                "name": "Wanjiru",
                "class": "Grade 3",
                "examType": exam,
                "scores": { "maths": mark, "english": mark, "kiswahili": mark, "integrated": mark }
            }),
        );
    }

    let partial = request_ok(
        &mut stdin,
        &mut reader,
        "p",
        "reports.overall",
        json!({ "name": "Wanjiru", "class": "Grade 3" }),
    );
    assert!(partial["overall"].is_null());
    assert_eq!(partial["sittings"][0]["examType"], "opener");
    assert_eq!(partial["sittings"][0]["mean"], 80.0);
    assert!(partial["sittings"][2]["mean"].is_null());

    request_ok(
        &mut stdin,
        &mut reader,
        "c2",
        "results.create",
        json!({
            "name": "Wanjiru",
            "class": "Grade 3",
            "examType": "endterm",
            "scores": { "maths": 70, "english": 70, "kiswahili": 70, "integrated": 70 }
        }),
    );
    let full = request_ok(
        &mut stdin,
        &mut reader,
        "f",
        "reports.overall",
        json!({ "name": "Wanjiru", "class": "Grade 3" }),
    );
    assert_eq!(full["overall"], 79.0);
    assert_eq!(full["sittings"][2]["weight"], 0.4);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
