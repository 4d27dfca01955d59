mod author;
mod keys;

pub use author::{create_local_author, AuthorError, LocalAuthor, RemoteAuthor};
pub use keys::{KeyError, PublicKey, SecretKey, Signature, KEY_SIZE, PEM_TAG, SIGNATURE_SIZE};
