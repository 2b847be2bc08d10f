mod test_support;

use serde_json::json;
use test_support::{create_student, open_workspace, request_err, request_ok, spawn_sidecar};

fn rows(result: &serde_json::Value) -> Vec<serde_json::Value> {
    result
        .get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("rows")
}

fn str_at<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str())
}

#[test]
fn unmarked_students_default_to_present_on_the_daily_sheet() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-default");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");
    let adams = create_student(&mut stdin, &mut reader, "badams", "Ben", "Adams");

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.dayOpen",
        json!({ "date": "2024-03-04" }),
    );
    let r = rows(&opened);
    assert_eq!(r.len(), 2);
    assert_eq!(str_at(&r[0], "studentId"), Some(adams.as_str()));
    assert_eq!(str_at(&r[1], "studentId"), Some(smith.as_str()));
    for row in &r {
        assert_eq!(str_at(row, "status"), Some("PRESENT"));
        assert_eq!(row.get("defaulted").and_then(|v| v.as_bool()), Some(true));
        assert!(row.get("recordId").map(|v| v.is_null()).unwrap_or(false));
    }
    assert_eq!(opened.get("defaultedCount").and_then(|v| v.as_u64()), Some(2));

    // Opening the sheet never writes records.
    let listed = request_ok(&mut stdin, &mut reader, "2", "attendance.list", json!({}));
    assert_eq!(
        listed.get("records").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(0)
    );
}

#[test]
fn saved_marks_override_the_default_for_that_day_only() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-save");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");
    let adams = create_student(&mut stdin, &mut reader, "badams", "Ben", "Adams");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.daySave",
        json!({
            "date": "2024-03-04T09:15:00",
            "markedBy": "teacher-1",
            "records": [
                { "studentId": smith, "status": "absent" },
                { "studentId": adams },
                { "status": "PRESENT" }
            ]
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(saved.get("skipped").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(str_at(&saved, "date"), Some("2024-03-04"));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.dayOpen",
        json!({ "date": "2024-03-04" }),
    );
    let r = rows(&opened);
    let smith_row = r
        .iter()
        .find(|x| str_at(x, "studentId") == Some(smith.as_str()))
        .expect("smith row");
    assert_eq!(str_at(smith_row, "status"), Some("ABSENT"));
    assert_eq!(smith_row.get("defaulted").and_then(|v| v.as_bool()), Some(false));
    assert!(str_at(smith_row, "recordId").is_some());
    let adams_row = r
        .iter()
        .find(|x| str_at(x, "studentId") == Some(adams.as_str()))
        .expect("adams row");
    assert_eq!(str_at(adams_row, "status"), Some("PRESENT"));
    assert_eq!(adams_row.get("defaulted").and_then(|v| v.as_bool()), Some(true));

    let next_day = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.dayOpen",
        json!({ "date": "2024-03-05" }),
    );
    assert!(rows(&next_day)
        .iter()
        .all(|x| str_at(x, "status") == Some("PRESENT")));

    // Re-saving the same day updates in place.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.daySave",
        json!({ "date": "2024-03-04", "records": [{ "studentId": smith, "status": "PRESENT" }] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.list",
        json!({ "date": "2024-03-04" }),
    );
    let records = listed.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(str_at(&records[0], "status"), Some("PRESENT"));
}

#[test]
fn unknown_students_reject_the_whole_save() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-unknown");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.daySave",
        json!({
            "date": "2024-03-04",
            "records": [
                { "studentId": smith, "status": "ABSENT" },
                { "studentId": "ghost", "status": "ABSENT" }
            ]
        }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.daySave",
        json!({ "date": "04/03/2024", "records": [] }),
    );
    assert_eq!(code, "bad_params");

    let listed = request_ok(&mut stdin, &mut reader, "3", "attendance.list", json!({}));
    assert_eq!(
        listed.get("records").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(0)
    );
}

#[test]
fn calendar_keeps_unmarked_days_visible_while_daily_sheet_defaults() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-calendar");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.daySave",
        json!({ "date": "2024-02-10", "records": [{ "studentId": smith, "status": "ABSENT" }] }),
    );

    let cal = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "student.calendar",
        json!({ "studentId": smith, "month": "2024-02" }),
    );
    let days = cal.get("days").and_then(|v| v.as_array()).expect("days");
    assert_eq!(days.len(), 29);
    assert_eq!(str_at(&days[9], "date"), Some("2024-02-10"));
    assert_eq!(str_at(&days[9], "status"), Some("ABSENT"));
    assert!(days[0].get("status").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(cal.pointer("/counts/absent").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(cal.pointer("/counts/present").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(cal.pointer("/counts/noRecord").and_then(|v| v.as_u64()), Some(28));

    // A workspace may flip the daily default; the calendar is unaffected.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "patch": { "defaultStatus": "ABSENT" } }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.dayOpen",
        json!({ "date": "2024-02-11" }),
    );
    assert_eq!(str_at(&rows(&opened)[0], "status"), Some("ABSENT"));
    let cal = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "student.calendar",
        json!({ "studentId": smith, "month": "2024-02" }),
    );
    assert_eq!(cal.pointer("/counts/noRecord").and_then(|v| v.as_u64()), Some(28));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "student.calendar",
        json!({ "studentId": "ghost", "month": "2024-02" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn repeated_student_in_one_save_collapses_to_last_status() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-repeat");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");
    let adams = create_student(&mut stdin, &mut reader, "badams", "Ben", "Adams");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.daySave",
        json!({
            "date": "2024-03-04",
            "records": [
                { "studentId": smith, "status": "ABSENT" },
                { "studentId": adams, "status": "ABSENT" },
                { "studentId": smith, "status": "PRESENT" }
            ]
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(saved.get("merged").and_then(|v| v.as_u64()), Some(1));
    let echoed = saved.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(echoed.len(), 2);
    assert_eq!(str_at(&echoed[0], "studentId"), Some(smith.as_str()));
    assert_eq!(str_at(&echoed[0], "status"), Some("PRESENT"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.list",
        json!({ "date": "2024-03-04", "studentId": smith }),
    );
    let stored = listed.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(stored.len(), 1);
    assert_eq!(str_at(&stored[0], "status"), Some("PRESENT"));
    assert_eq!(str_at(&stored[0], "id"), str_at(&echoed[0], "id"));
}

#[test]
fn single_mark_upserts_one_student_day() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _workspace = open_workspace(&mut stdin, &mut reader, "attendanced-day-mark");
    let smith = create_student(&mut stdin, &mut reader, "asmith", "Ada", "Smith");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "studentId": smith, "date": "2024-03-04", "status": "ABSENT", "markedBy": "t1" }),
    );
    let record_id = first
        .pointer("/record/id")
        .and_then(|v| v.as_str())
        .expect("record id")
        .to_string();
    assert_eq!(
        first.pointer("/record/markedBy").and_then(|v| v.as_str()),
        Some("t1")
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.mark",
        json!({ "studentId": smith, "date": "2024-03-04", "status": "PRESENT" }),
    );
    assert_eq!(
        second.pointer("/record/id").and_then(|v| v.as_str()),
        Some(record_id.as_str())
    );
    assert_eq!(
        second.pointer("/record/status").and_then(|v| v.as_str()),
        Some("PRESENT")
    );

    let cases = [
        (json!({ "studentId": "ghost", "date": "2024-03-04", "status": "ABSENT" }), "not_found"),
        (json!({ "studentId": smith, "date": "2024-3-4", "status": "ABSENT" }), "bad_params"),
        (json!({ "studentId": smith, "date": "2024-03-04", "status": "LATE" }), "bad_params"),
    ];
    for (i, (params, expected)) in cases.into_iter().enumerate() {
        let code = request_err(&mut stdin, &mut reader, &format!("m{}", i), "attendance.mark", params);
        assert_eq!(code, expected, "case {}", i);
    }
}
