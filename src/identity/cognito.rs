//! Cognito user pool IdentityStore implementation.
//!
//! Principals are created with `AdminCreateUser`; the principal id is the
//! `Username` Cognito reports back, which for e-mail-alias pools is the
//! generated `sub` rather than the address the caller supplied.
//! Principals are listed with paginated `ListUsers`.

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::operation::admin_create_user::AdminCreateUserError;
use aws_sdk_cognitoidentityprovider::operation::admin_delete_user::AdminDeleteUserError;
use aws_sdk_cognitoidentityprovider::types::{
    AttributeType, DeliveryMediumType, MessageActionType, UserType,
};
use aws_sdk_cognitoidentityprovider::Client;
use tracing::{debug, error, info};

use super::{
    DeliveryMedium, IdentityError, IdentityStore, Principal, PrincipalId, PrincipalSpec, Result,
};
use crate::config::IdentityConfig;
use crate::utils::bootstrap::load_aws_config;

/// Cognito implementation of IdentityStore.
pub struct CognitoIdentityStore {
    client: Client,
    user_pool_id: String,
}

impl CognitoIdentityStore {
    /// Create a store from the identity section of the configuration.
    pub async fn new(config: &IdentityConfig) -> Self {
        let sdk_config = load_aws_config(config.region.as_deref()).await;

        let client = if let Some(endpoint) = config.endpoint_url.as_deref() {
            let cognito_config = aws_sdk_cognitoidentityprovider::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(cognito_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(user_pool_id = %config.user_pool_id, "Connected to Cognito");

        Self::from_client(client, config.user_pool_id.clone())
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, user_pool_id: impl Into<String>) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
        }
    }
}

fn delivery_medium(medium: DeliveryMedium) -> DeliveryMediumType {
    match medium {
        DeliveryMedium::Email => DeliveryMediumType::Email,
        DeliveryMedium::Sms => DeliveryMediumType::Sms,
    }
}

fn user_attributes(spec: &PrincipalSpec) -> Result<Vec<AttributeType>> {
    spec.attributes
        .iter()
        .map(|(name, value)| {
            AttributeType::builder()
                .name(name)
                .value(value)
                .build()
                .map_err(|e| IdentityError::Unknown {
                    operation: "AdminCreateUser",
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Principal id from the username `AdminCreateUser` reported back.
///
/// The user exists once the call succeeded, so a response without a
/// username leaves a principal nobody holds the id of.
fn created_principal_id(reported: Option<&str>, requested: &str) -> Result<PrincipalId> {
    match reported {
        Some(username) => Ok(PrincipalId::from(username)),
        None => {
            error!(
                username = %requested,
                "Cognito user created but response carried no username, reconcile manually"
            );
            Err(IdentityError::Unknown {
                operation: "AdminCreateUser",
                message: format!(
                    "user '{}' was created but the response carried no username",
                    requested
                ),
            })
        }
    }
}

fn principal(user: &UserType) -> Option<Principal> {
    let principal_id = PrincipalId::from(user.username()?);
    let attributes = user
        .attributes()
        .iter()
        .filter_map(|attribute| {
            attribute
                .value()
                .map(|value| (attribute.name().to_string(), value.to_string()))
        })
        .collect();
    Some(Principal {
        principal_id,
        attributes,
    })
}

#[async_trait]
impl IdentityStore for CognitoIdentityStore {
    async fn create_principal(&self, spec: &PrincipalSpec) -> Result<PrincipalId> {
        let mediums = spec
            .delivery_mediums
            .iter()
            .copied()
            .map(delivery_medium)
            .collect::<Vec<_>>();

        let output = self
            .client
            .admin_create_user()
            .user_pool_id(&self.user_pool_id)
            .username(&spec.username)
            .set_user_attributes(Some(user_attributes(spec)?))
            .set_desired_delivery_mediums((!mediums.is_empty()).then_some(mediums))
            .set_message_action(spec.suppress_invitation.then_some(MessageActionType::Suppress))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                match e.into_service_error() {
                    AdminCreateUserError::UsernameExistsException(_) => {
                        IdentityError::AlreadyExists {
                            username: spec.username.clone(),
                        }
                    }
                    _ => IdentityError::Unknown {
                        operation: "AdminCreateUser",
                        message,
                    },
                }
            })?;

        let principal_id = created_principal_id(
            output.user().and_then(|user| user.username()),
            &spec.username,
        )?;

        debug!(
            username = %spec.username,
            principal_id = %principal_id,
            "Created Cognito user"
        );

        Ok(principal_id)
    }

    async fn delete_principal(&self, principal_id: &PrincipalId) -> Result<()> {
        self.client
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(principal_id.as_str())
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                match e.into_service_error() {
                    AdminDeleteUserError::UserNotFoundException(_) => IdentityError::NotFound {
                        principal_id: principal_id.clone(),
                    },
                    _ => IdentityError::Unknown {
                        operation: "AdminDeleteUser",
                        message,
                    },
                }
            })?;

        debug!(principal_id = %principal_id, "Deleted Cognito user");

        Ok(())
    }

    async fn list_principals(&self) -> Result<Vec<Principal>> {
        let mut principals = Vec::new();
        let mut pagination_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_users()
                .user_pool_id(&self.user_pool_id)
                .set_pagination_token(pagination_token.take())
                .send()
                .await
                .map_err(|e| IdentityError::Unknown {
                    operation: "ListUsers",
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            principals.extend(output.users().iter().filter_map(principal));

            match output.pagination_token() {
                Some(token) if !token.is_empty() => pagination_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(count = principals.len(), "Listed Cognito users");

        Ok(principals)
    }
}
