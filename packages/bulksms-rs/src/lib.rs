// BulkSMS.ma gateway client used for OTP delivery.
// The gateway only accepts local dialing format (06/07XXXXXXXX), so callers
// reformat international numbers before handing them over.

use std::collections::HashMap;

use reqwest::Client;

#[derive(Debug, Clone)]
pub struct BulkSmsOptions {
    /// Send endpoint, e.g. https://bulksms.ma/developer/sms/send
    pub api_url: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct BulkSmsService {
    options: BulkSmsOptions,
    client: Client,
}

impl BulkSmsService {
    pub fn new(options: BulkSmsOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Send a single SMS. The gateway expects form-urlencoded token/tel/message.
    pub async fn send_sms(&self, local_number: &str, message: &str) -> Result<(), &'static str> {
        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("token", &self.options.api_token);
        form_body.insert("tel", local_number);
        form_body.insert("message", message);

        let res = self
            .client
            .post(&self.options.api_url)
            .form(&form_body)
            .send()
            .await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    eprintln!("BulkSMS error ({}): {}", status, error_body);
                    return Err("BulkSMS returned an error");
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("Request to BulkSMS failed: {}", e);
                Err("Error sending SMS")
            }
        }
    }
}
