use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Loads the shared AWS configuration from the default provider chain.
pub async fn load_aws_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .load()
        .await
}
