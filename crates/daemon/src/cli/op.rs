use std::path::PathBuf;

use magic_folder_daemon::http_server::api::client::ApiClient;

/// Everything an operation may need: a client for the running daemon and
/// the application directory override
#[derive(Debug, Clone)]
pub struct OpContext {
    pub client: ApiClient,
    pub config_path: Option<PathBuf>,
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display + std::fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate `Command`, `OpOutput` and `OpError` for a list of
/// `(Variant, OpType)` pairs, with `Command::execute` dispatching to each op
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $op:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($op),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$op as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$op as $crate::cli::op::Op>::Error),
            )*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{}", output),)*
                }
            }
        }

        impl Command {
            pub async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<OpOutput, OpError> {
                match self {
                    $(
                        Command::$variant(op) => <$op as $crate::cli::op::Op>::execute(op, ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
