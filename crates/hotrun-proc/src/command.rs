use crate::error::CommandError;

/// Split a command line into the program and its arguments, honoring shell
/// quoting (`'...'`, `"..."`, backslash escapes). No shell is involved.
pub fn split(command: &str) -> Result<(String, Vec<String>), CommandError> {
	let mut parts = shell_words::split(command).map_err(|e| CommandError::Parse {
		command: command.to_string(),
		reason: e.to_string(),
	})?;

	if parts.is_empty() {
		return Err(CommandError::Empty);
	}

	let program = parts.remove(0);
	Ok((program, parts))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_plain_words() {
		let (program, args) = split("go build -o tmp/app .").unwrap();
		assert_eq!(program, "go");
		assert_eq!(args, vec!["build", "-o", "tmp/app", "."]);
	}

	#[test]
	fn honors_quotes() {
		let (program, args) = split("go build -gcflags='all=-N -l' -o \"tmp/my app\"").unwrap();
		assert_eq!(program, "go");
		assert_eq!(args, vec!["build", "-gcflags=all=-N -l", "-o", "tmp/my app"]);
	}

	#[test]
	fn rejects_empty() {
		assert!(matches!(split("   "), Err(CommandError::Empty)));
	}

	#[test]
	fn rejects_unterminated_quote() {
		assert!(matches!(split("echo 'oops"), Err(CommandError::Parse { .. })));
	}
}
