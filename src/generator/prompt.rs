use crate::playback::script::FileScript;

const PROJECT_SCHEMA: &str = r#"{
  "task_id": "short-kebab-case-id",
  "description": "one sentence",
  "files": [
    {"filename": "module.py", "content": "..."},
    {"filename": "main.py", "content": "..."}
  ],
  "entry_file": "main.py"
}"#;

const EXTENSION_SCHEMA: &str = r#"{
  "files": [
    {"filename": "existing.py", "action": "modify", "content": "full new content"},
    {"filename": "new_module.py", "action": "create", "content": "..."},
    {"filename": "obsolete.py", "action": "delete"}
  ]
}"#;

/// Prompt asking for a small, self-contained, runnable project.
pub fn new_project_prompt(topic: Option<&str>, language: &str) -> String {
    let topic = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("a small command-line utility of your choice");
    format!(
        "Write a small {language} project: {topic}.\n\
         Use 2 to 4 files, each under 80 lines. The entry file must run without \
         arguments, needs no third-party packages, prints its results, and exits 0 on success.\n\
         Respond with ONLY valid JSON matching this shape, no commentary:\n{PROJECT_SCHEMA}\n"
    )
}

/// Prompt asking for changes to the project currently on screen.
pub fn extension_prompt(instruction: &str, scripts: &[FileScript], entry_file: &str) -> String {
    let mut prompt = format!(
        "You are extending an existing project. Change request: {}.\n\
         The entry file is `{entry_file}` and must keep running without arguments.\n\
         Current files:\n\n",
        instruction.trim()
    );
    for script in scripts {
        prompt.push_str(&format!(
            "--- {} ---\n{}\n",
            script.filename,
            script.text()
        ));
    }
    prompt.push_str(
        "\nReturn only the files that change. For `modify`, give the complete new content.\n\
         Respond with ONLY valid JSON matching this shape, no commentary:\n",
    );
    prompt.push_str(EXTENSION_SCHEMA);
    prompt.push('\n');
    prompt
}
