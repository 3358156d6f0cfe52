use super::*;
use chrono::NaiveDate;

fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

#[test]
fn index_owner_routing() {
    assert_eq!(IndexOwner::Course(3).table(), "courses");
    assert_eq!(IndexOwner::File(9).table(), "files");
    assert_eq!(IndexOwner::File(9).id(), 9);
    assert_eq!(IndexOwner::Course(3).to_string(), "course 3");
    assert_eq!(IndexOwner::File(9).to_string(), "file 9");
}

#[test]
fn stored_message_conversion() {
    let message = StoredMessage {
        id: 1,
        chat_id: 2,
        role: "assistant".to_string(),
        content: "Corals are animals.".to_string(),
        created_date: timestamp(),
    };
    assert_eq!(
        message.to_chat_message().expect("role should parse"),
        ChatMessage::assistant("Corals are animals.")
    );

    let invalid = StoredMessage {
        role: "narrator".to_string(),
        ..message
    };
    assert!(invalid.to_chat_message().is_err());
}

#[test]
fn course_serialization() {
    let course = Course {
        id: 1,
        title: "Reef Ecology".to_string(),
        description: None,
        indexed: false,
        created_date: timestamp(),
    };

    let json = serde_json::to_string(&course).expect("should serialize");
    let parsed: Course = serde_json::from_str(&json).expect("should deserialize");
    assert_eq!(parsed, course);
}
