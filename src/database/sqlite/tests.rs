use super::*;
use anyhow::Result;
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

async fn seed_file(database: &Database, filename: &str) -> Result<(Course, FileSummary)> {
    let course = database
        .create_course(NewCourse {
            title: "Marine Biology".to_string(),
            description: None,
        })
        .await?;
    let module = database
        .create_module(NewModule {
            course_id: course.id,
            title: "Reefs".to_string(),
            ordering: None,
        })
        .await?;
    let file = database
        .create_file(NewFile {
            module_id: module.id,
            title: filename.to_string(),
            filename: filename.to_string(),
            file_data: b"Coral reefs are diverse.".to_vec(),
            ordering: None,
        })
        .await?;
    Ok((course, file))
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (temp_dir, database) = create_test_database().await?;
    assert!(temp_dir.path().join(DATABASE_FILENAME).exists());

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
    )
    .fetch_all(database.pool())
    .await?;

    let expected_tables: HashSet<&'static str> =
        ["courses", "modules", "files", "chats", "messages"]
            .into_iter()
            .collect();

    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn integration_reopen_runs_migrations_once() -> Result<()> {
    let (temp_dir, database) = create_test_database().await?;
    seed_file(&database, "a.txt").await?;
    drop(database);

    let reopened = Database::initialize_from_config_dir(temp_dir.path()).await?;
    assert_eq!(reopened.list_courses().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn integration_foreign_key_constraints() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let orphan = database
        .create_module(NewModule {
            course_id: 404,
            title: "Nowhere".to_string(),
            ordering: None,
        })
        .await;
    assert!(orphan.is_err());

    let (course, file) = seed_file(&database, "a.txt").await?;
    CourseQueries::delete(database.pool(), course.id).await?;
    assert!(database.get_file_summary(file.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn integration_index_repository() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let (course, file) = seed_file(&database, "a.txt").await?;

    let stored = database.get_file(file.id).await?.expect("file should exist");
    assert_eq!(stored.file_data, b"Coral reefs are diverse.".to_vec());
    assert_eq!(database.list_course_files(course.id).await?, vec![stored]);
    assert_eq!(database.course_id_for_file(file.id).await?, Some(course.id));

    assert!(database.course_index(course.id).await?.is_none());
    let blobs = IndexBlobs {
        index: vec![0xAB; 8],
        metadata: b"{}".to_vec(),
    };
    database.replace_course_index(course.id, &blobs).await?;
    database.replace_file_index(file.id, &blobs).await?;

    assert_eq!(database.course_index(course.id).await?, Some(blobs.clone()));
    assert_eq!(database.file_index(file.id).await?, Some(blobs));
    assert!(
        database
            .get_course(course.id)
            .await?
            .expect("course should exist")
            .indexed
    );

    Ok(())
}

#[tokio::test]
async fn integration_chat_repository() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let (course, _) = seed_file(&database, "a.txt").await?;

    let chat = database
        .create_chat(NewChat {
            user_id: "student-7".to_string(),
            course_id: course.id,
            title: "Symbiosis".to_string(),
        })
        .await?;
    assert_eq!(database.get_chat(chat.id).await?, Some(chat.clone()));

    database
        .append_message(chat.id, &ChatMessage::user("What do zooxanthellae do?"))
        .await?;
    database
        .append_message(chat.id, &ChatMessage::assistant("They photosynthesize."))
        .await?;

    assert_eq!(
        database.chat_history(chat.id).await?,
        vec![
            ChatMessage::user("What do zooxanthellae do?"),
            ChatMessage::assistant("They photosynthesize."),
        ]
    );

    Ok(())
}
