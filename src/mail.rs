//! Transactional email via the Resend API, plus the password-reset
//! template. Registration confirms emails through the admin API, so no
//! confirmation mail is sent.

use anyhow::{bail, Result};
use serde_json::json;
use std::time::Duration;

use crate::config::MailConfig;

const RESEND_URL: &str = "https://api.resend.com/emails";

pub struct MailClient {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

pub struct EmailTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl MailClient {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let api_key = std::env::var("RESEND_API_KEY")
            .map_err(|_| anyhow::anyhow!("RESEND_API_KEY environment variable not set"))?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
            api_key,
            from: config.from.clone(),
        })
    }

    pub async fn send(&self, to: &str, template: &EmailTemplate) -> Result<()> {
        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": template.subject,
                "html": template.html,
                "text": template.text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Resend error {}: {}", status, body);
        }
        Ok(())
    }
}

/// Password-recovery email.
pub fn password_reset_template(user_name: &str, reset_url: &str) -> EmailTemplate {
    let year = chrono::Utc::now().format("%Y");
    EmailTemplate {
        subject: "Recupera tu contraseña - Parroquia".to_string(),
        html: format!(
            r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <style>
      body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif; line-height: 1.6; color: #333; }}
      .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
      .header {{ background: linear-gradient(135deg, #f59e0b 0%, #ef4444 100%); color: white; padding: 30px; text-align: center; border-radius: 10px 10px 0 0; }}
      .content {{ background: white; padding: 30px; border: 1px solid #e5e7eb; border-top: none; }}
      .button {{ display: inline-block; background: #ef4444; color: white; padding: 12px 30px; text-decoration: none; border-radius: 6px; margin: 20px 0; }}
      .footer {{ text-align: center; color: #6b7280; font-size: 14px; margin-top: 20px; }}
    </style>
  </head>
  <body>
    <div class="container">
      <div class="header">
        <h1>Recupera tu contraseña</h1>
      </div>
      <div class="content">
        <p>Hola {user_name},</p>
        <p>Hemos recibido una solicitud para restablecer tu contraseña. Haz clic en el botón para crear una nueva:</p>
        <div style="text-align: center;">
          <a href="{reset_url}" class="button">Restablecer contraseña</a>
        </div>
        <p style="color: #6b7280; font-size: 14px;">Si no solicitaste este cambio, puedes ignorar este correo.</p>
        <p style="color: #6b7280; font-size: 14px;">Este enlace expirará en 24 horas.</p>
      </div>
      <div class="footer">
        <p>© {year} Parroquia. Todos los derechos reservados.</p>
      </div>
    </div>
  </body>
</html>"#
        ),
        text: format!(
            "Hola {user_name},\n\nHemos recibido una solicitud para restablecer tu contraseña.\n\nAbre este enlace para crear una nueva: {reset_url}\n\nSi no solicitaste este cambio, puedes ignorar este correo. El enlace expira en 24 horas.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_template_embeds_name_and_link() {
        let t = password_reset_template("María", "https://example.com/reset?token=abc");
        assert!(t.subject.contains("contraseña"));
        assert!(t.html.contains("Hola María"));
        assert!(t.html.contains("https://example.com/reset?token=abc"));
        assert!(t.text.contains("https://example.com/reset?token=abc"));
    }

    #[test]
    fn reset_template_has_text_alternative() {
        let t = password_reset_template("Juan", "https://example.com/reset");
        assert!(!t.text.contains('<'));
        assert!(t.text.contains("Juan"));
    }
}
