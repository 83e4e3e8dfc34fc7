use crate::models::chat::{ChatMessage, Role, Turn};
use crate::utils::error::ValidationError;

/// Check a relay request and return the new user turn it ends with.
///
/// Runs before any history read or backend call.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<Turn, ValidationError> {
    let Some(last) = messages.last() else {
        return Err(ValidationError::EmptyInput);
    };

    for (index, message) in messages.iter().enumerate() {
        if Role::parse(&message.role).is_none() {
            return Err(ValidationError::InvalidRole {
                index,
                role: message.role.clone(),
            });
        }
        if message.content.is_empty() {
            return Err(ValidationError::EmptyContent { index });
        }
    }

    if Role::parse(&last.role) != Some(Role::User) {
        return Err(ValidationError::NotUserTerminated {
            role: last.role.clone(),
        });
    }

    Ok(Turn::user(last.content.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_user_terminated_list() {
        let messages = vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("How are you?"),
        ];
        let turn = validate_messages(&messages).unwrap();
        assert!(turn.is_user());
        assert_eq!(turn.content(), "How are you?");
    }

    #[test]
    fn test_rejects_empty_list() {
        assert_eq!(validate_messages(&[]), Err(ValidationError::EmptyInput));
    }

    #[test]
    fn test_rejects_unknown_role() {
        let messages = vec![ChatMessage::user("Hi"), ChatMessage::new("moderator", "x")];
        assert_eq!(
            validate_messages(&messages),
            Err(ValidationError::InvalidRole {
                index: 1,
                role: "moderator".into()
            })
        );
    }

    #[test]
    fn test_rejects_empty_content() {
        let messages = vec![ChatMessage::user(""), ChatMessage::user("Hi")];
        assert_eq!(
            validate_messages(&messages),
            Err(ValidationError::EmptyContent { index: 0 })
        );
    }

    #[test]
    fn test_whitespace_content_is_accepted() {
        assert!(validate_messages(&[ChatMessage::user("  ")]).is_ok());
    }

    #[test]
    fn test_rejects_assistant_last() {
        let messages = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello")];
        assert_eq!(
            validate_messages(&messages),
            Err(ValidationError::NotUserTerminated {
                role: "assistant".into()
            })
        );
    }

    #[test]
    fn test_role_checked_before_content_and_in_index_order() {
        let messages = vec![
            ChatMessage::new("system", ""),
            ChatMessage::new("moderator", "x"),
        ];
        assert_eq!(
            validate_messages(&messages),
            Err(ValidationError::InvalidRole {
                index: 0,
                role: "system".into()
            })
        );
    }
}
