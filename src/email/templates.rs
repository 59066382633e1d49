/// Email template functions
///
/// This module provides functions to generate common email templates.
use super::{send_email, EmailResult};

/// Send an account activation email
///
/// The `sign` is the signed username produced by [`crate::signer::sign`];
/// following the link activates the account.
pub async fn send_activation_email(
    to: &str,
    username: &str,
    sign: &str,
    base_url: &str,
) -> EmailResult<()> {
    let activation_link = format!("{}/register/activate/{}", base_url, sign);

    let body_text = format!(
        r#"Hello {},

Thank you for registering!

Please activate your account by clicking the link below:
{}

Until you do, you will not be able to sign in.

---
Bboard
"#,
        username, activation_link
    );

    let body_html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Account Activation</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Welcome to Bboard!</h2>
        <p>Hello <strong>{}</strong>,</p>
        <p>Thank you for registering. Please activate your account to start posting listings.</p>
        <p style="margin: 30px 0;">
            <a href="{}"
               style="background-color: #28a745; color: white; padding: 12px 24px;
                      text-decoration: none; border-radius: 4px; display: inline-block;">
                Activate Account
            </a>
        </p>
        <p>Or copy and paste this link into your browser:</p>
        <p style="word-break: break-all; color: #28a745;">{}</p>
        <hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
        <p style="color: #666; font-size: 0.9em;">
            If you did not create an account, please ignore this email.
        </p>
    </div>
</body>
</html>"#,
        username, activation_link, activation_link
    );

    send_email(to, "Activate Your Account", &body_text, Some(&body_html)).await
}

/// Send a password reset email
pub async fn send_password_reset_email(
    to: &str,
    username: &str,
    reset_token: &str,
    base_url: &str,
) -> EmailResult<()> {
    let reset_link = format!("{}/password-reset/{}", base_url, reset_token);

    let body_text = format!(
        r#"Hello {},

You have requested to reset your password.

Click the link below to reset your password:
{}

This link will expire in 1 hour.

If you did not request a password reset, please ignore this email.

---
Bboard
"#,
        username, reset_link
    );

    let body_html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password Reset</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Password Reset Request</h2>
        <p>Hello <strong>{}</strong>,</p>
        <p>You have requested to reset your password.</p>
        <p>Click the button below to reset your password:</p>
        <p style="margin: 30px 0;">
            <a href="{}"
               style="background-color: #007bff; color: white; padding: 12px 24px;
                      text-decoration: none; border-radius: 4px; display: inline-block;">
                Reset Password
            </a>
        </p>
        <p>Or copy and paste this link into your browser:</p>
        <p style="word-break: break-all; color: #007bff;">{}</p>
        <p><strong>This link will expire in 1 hour.</strong></p>
        <hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
        <p style="color: #666; font-size: 0.9em;">
            If you did not request a password reset, please ignore this email.
        </p>
    </div>
</body>
</html>"#,
        username, reset_link, reset_link
    );

    send_email(to, "Password Reset Request", &body_text, Some(&body_html)).await
}
