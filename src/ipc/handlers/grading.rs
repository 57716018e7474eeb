use crate::grading::{
    aggregate, classify, has_failing_subject, is_below_passing_cgpa, marks_from_json, Grade,
    Marks, MissingMarkPolicy,
};
use crate::ipc::helpers::{grading_settings_or_default, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::results::parse_subjects;
use serde_json::{json, Value};

fn handle_scale(req: &Request) -> Value {
    let tiers: Vec<Value> = Grade::ALL
        .iter()
        .map(|g| {
            json!({
                "grade": g,
                "minMarks": g.min_marks(),
                "point": g.point(),
            })
        })
        .collect();
    respond(&req.id, Ok(json!({ "scale": tiers })))
}

fn classify_one(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let (opts, _) = grading_settings_or_default(&state.db)?;
    let Some(raw) = marks_from_json(req.params.get("marks"))? else {
        return Ok(match opts.missing_mark_policy {
            MissingMarkPolicy::Ungraded => json!({
                "marks": null,
                "grade": "-",
                "point": null,
                "graded": false,
            }),
            MissingMarkPolicy::Fail => json!({
                "marks": null,
                "grade": Grade::F,
                "point": Grade::F.point(),
                "graded": true,
            }),
        });
    };
    let marks = Marks::new(raw)?;
    let grade = classify(marks);
    Ok(json!({
        "marks": marks,
        "grade": grade,
        "point": grade.point(),
        "graded": true,
    }))
}

fn aggregate_subjects(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let (opts, _) = grading_settings_or_default(&state.db)?;
    let items = match req.params.get("subjects") {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[][..],
        Some(_) => return Err(HandlerErr::bad_params("subjects must be an array")),
    };
    let (records, _) = parse_subjects(items)?;
    let outcome = aggregate(&records, &opts);
    let any_f = has_failing_subject(&records);
    let below = !records.is_empty() && is_below_passing_cgpa(outcome.cgpa, opts.passing_cgpa);
    Ok(json!({
        "subjects": records,
        "cgpa": outcome.cgpa,
        "status": outcome.status,
        "hasFailingSubject": any_f,
        "belowPassingCgpa": below,
        "rulesDisagree": !records.is_empty() && any_f != below,
        "weighted": opts.weight_by_credit,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grading.scale" => Some(handle_scale(req)),
        "grading.classify" => Some(respond(&req.id, classify_one(state, req))),
        "grading.aggregate" => Some(respond(&req.id, aggregate_subjects(state, req))),
        _ => None,
    }
}
