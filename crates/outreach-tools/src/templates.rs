//! Built-in message templates.
//!
//! Templates produce the subject and a signed body. Unsubscribe text and the
//! legal footer are added later by compliance at send time.

pub const ACUPUNCTURE_SUBJECT: &str = "Professional Introduction - Avicenna Acupuncture";

/// Append a `Best regards` signature unless the body already ends with the
/// sender name.
pub fn sign(body: &str, from_name: &str) -> String {
    let mut out = body.trim_end().to_string();
    if from_name.is_empty() || out.ends_with(from_name) {
        return out;
    }
    out.push_str("\n\nBest regards,\n");
    out.push_str(from_name);
    out
}

pub fn acupuncture(contact_name: &str, company: &str, from_name: &str) -> (String, String) {
    let body = format!(
        "Dear {contact_name},

I hope this message finds you well. I'm reaching out from Avicenna Acupuncture, \
serving the Potomac community with traditional Chinese medicine approaches.

I noticed {company} and appreciate your dedication to community wellness. \
Many of our patients find significant relief from:
• Chronic pain conditions
• Stress and anxiety management
• Sleep disorders
• Digestive issues

We're currently offering $30 off initial consultations for healthcare professionals \
in our community.

Would you be interested in learning more about how acupuncture could benefit you \
or your patients?"
    );
    (ACUPUNCTURE_SUBJECT.to_string(), sign(&body, from_name))
}

pub fn generic_b2b(
    contact_name: &str,
    company: &str,
    industry: &str,
    from_name: &str,
) -> (String, String) {
    let industry_text = if industry.is_empty() {
        String::new()
    } else {
        format!(" in the {industry} industry")
    };
    let body = format!(
        "Hello {contact_name},

I came across {company}{industry_text} and was impressed by your work.

Our consulting team helps businesses optimize their operations and \
accelerate growth through strategic planning and process improvement.

I'd love to learn more about your business challenges and explore if there might \
be synergy between our organizations.

Would you have 15 minutes for a brief chat next week?"
    );
    (format!("Connection Request - {company}"), sign(&body, from_name))
}
